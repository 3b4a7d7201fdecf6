//! Request parameters for scans and queries.
//!
//! These types describe *what* the user asked for in structured form. They are validated
//! locally before anything is sent to DynamoDB and turned into expressions by
//! [`expression`](crate::aws::dynamodb::expression).

use crate::aws::dynamodb::expression::{self, BuilderError};
use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A single DynamoDB item as returned by the SDK.
pub type Item = HashMap<String, AttributeValue>;

/// The largest `Limit` DynamoDB accepts for a single scan or query page.
pub const MAX_PAGE_LIMIT: i32 = 1000;

/// The largest `Limit` DynamoDB accepts for a single `ListTables` call.
pub const MAX_TABLE_LIST_LIMIT: i32 = 100;

/// A parameter contract violation detected before any network call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("A table name is required")]
    MissingTableName,
    #[error("The limit must be between 1 and {max} but {given} was given")]
    LimitOutOfRange { given: i32, max: i32 },
    #[error("The partition key needs an attribute name")]
    MissingPartitionKeyName,
    #[error("The partition key '{0}' needs a value")]
    MissingPartitionKeyValue(String),
    #[error("The sort key condition needs an attribute name")]
    MissingSortKeyName,
    #[error("An index name must not be empty")]
    EmptyIndexName,
    #[error("A filter expression must not be blank")]
    BlankFilterExpression,
}

/// A primitive value typed for DynamoDB.
///
/// Numbers are kept as their decimal text, which is how DynamoDB transports them anyway.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    String(String),
    Number(String),
    Bool(bool),
}

impl Scalar {
    /// Interprets free-form text typed into a form field.
    ///
    /// Surrounding whitespace is dropped. `true` and `false` become booleans, anything that
    /// parses as a finite number becomes a number and everything else stays a string.
    pub fn infer(text: &str) -> Scalar {
        match text.trim() {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            trimmed if is_number(trimmed) => Scalar::Number(trimmed.to_string()),
            trimmed => Scalar::String(trimmed.to_string()),
        }
    }

    /// Converts this value into the attribute value bound to an expression placeholder.
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Scalar::String(value) => AttributeValue::S(value.clone()),
            Scalar::Number(value) => AttributeValue::N(value.clone()),
            Scalar::Bool(value) => AttributeValue::Bool(*value),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Scalar::String(value) if value.is_empty())
    }
}

fn is_number(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && text.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::String(value) => write!(f, "\"{}\"", value),
            Scalar::Number(value) => write!(f, "{}", value),
            Scalar::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.to_string())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Number(value.to_string())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::Number(value.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value.to_string())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Raised when an operator name cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unknown operator '{0}'")]
pub struct UnknownOperator(pub String);

/// Comparison allowed on a sort key within a key condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKeyOperator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    BeginsWith,
}

impl SortKeyOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKeyOperator::Eq => "eq",
            SortKeyOperator::Lt => "lt",
            SortKeyOperator::Lte => "lte",
            SortKeyOperator::Gt => "gt",
            SortKeyOperator::Gte => "gte",
            SortKeyOperator::Between => "between",
            SortKeyOperator::BeginsWith => "begins_with",
        }
    }
}

impl Display for SortKeyOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKeyOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" => Ok(SortKeyOperator::Eq),
            "lt" | "<" => Ok(SortKeyOperator::Lt),
            "lte" | "<=" => Ok(SortKeyOperator::Lte),
            "gt" | ">" => Ok(SortKeyOperator::Gt),
            "gte" | ">=" => Ok(SortKeyOperator::Gte),
            "between" => Ok(SortKeyOperator::Between),
            "begins_with" => Ok(SortKeyOperator::BeginsWith),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

/// Comparison allowed in a filter condition on any attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    BeginsWith,
    Contains,
    AttributeExists,
    AttributeNotExists,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Between => "between",
            FilterOperator::BeginsWith => "begins_with",
            FilterOperator::Contains => "contains",
            FilterOperator::AttributeExists => "attribute_exists",
            FilterOperator::AttributeNotExists => "attribute_not_exists",
        }
    }

    /// Returns `false` for the existence checks, which only look at the attribute name.
    pub fn takes_value(&self) -> bool {
        !matches!(
            self,
            FilterOperator::AttributeExists | FilterOperator::AttributeNotExists
        )
    }
}

impl Display for FilterOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" => Ok(FilterOperator::Eq),
            "ne" | "<>" | "!=" => Ok(FilterOperator::Ne),
            "lt" | "<" => Ok(FilterOperator::Lt),
            "lte" | "<=" => Ok(FilterOperator::Lte),
            "gt" | ">" => Ok(FilterOperator::Gt),
            "gte" | ">=" => Ok(FilterOperator::Gte),
            "between" => Ok(FilterOperator::Between),
            "begins_with" => Ok(FilterOperator::BeginsWith),
            "contains" => Ok(FilterOperator::Contains),
            "attribute_exists" | "exists" => Ok(FilterOperator::AttributeExists),
            "attribute_not_exists" | "not_exists" => Ok(FilterOperator::AttributeNotExists),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

/// Selects the single partition a query addresses.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionKeyCondition {
    pub name: String,
    pub value: Scalar,
}

impl PartitionKeyCondition {
    pub fn new(name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Narrows a query to a range of sort key values.
///
/// `value2` is the upper bound of `between` and ignored by every other operator.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKeyCondition {
    pub name: String,
    pub operator: SortKeyOperator,
    pub value: Scalar,
    pub value2: Option<Scalar>,
}

impl SortKeyCondition {
    pub fn new(
        name: impl Into<String>,
        operator: SortKeyOperator,
        value: impl Into<Scalar>,
    ) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
            value2: None,
        }
    }

    pub fn between(
        name: impl Into<String>,
        lower: impl Into<Scalar>,
        upper: impl Into<Scalar>,
    ) -> Self {
        Self {
            name: name.into(),
            operator: SortKeyOperator::Between,
            value: lower.into(),
            value2: Some(upper.into()),
        }
    }
}

/// A condition on a non-key attribute, applied by DynamoDB after items were read.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterCondition {
    pub attribute: String,
    pub operator: FilterOperator,
    pub value: Option<Scalar>,
    pub value2: Option<Scalar>,
}

impl FilterCondition {
    pub fn new(
        attribute: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Scalar>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: Some(value.into()),
            value2: None,
        }
    }

    pub fn between(
        attribute: impl Into<String>,
        lower: impl Into<Scalar>,
        upper: impl Into<Scalar>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator: FilterOperator::Between,
            value: Some(lower.into()),
            value2: Some(upper.into()),
        }
    }

    pub fn exists(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: FilterOperator::AttributeExists,
            value: None,
            value2: None,
        }
    }

    pub fn not_exists(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: FilterOperator::AttributeNotExists,
            value: None,
            value2: None,
        }
    }
}

/// Parameters of a query against one partition of a table or index.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParams {
    pub table_name: String,
    pub partition_key: PartitionKeyCondition,
    pub sort_key: Option<SortKeyCondition>,
    pub filter_conditions: Vec<FilterCondition>,
    pub limit: Option<i32>,
    pub scan_index_forward: Option<bool>,
    pub index_name: Option<String>,
}

impl QueryParams {
    pub fn new(table_name: impl Into<String>, partition_key: PartitionKeyCondition) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key,
            sort_key: None,
            filter_conditions: Vec::new(),
            limit: None,
            scan_index_forward: None,
            index_name: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: SortKeyCondition) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_filter(mut self, condition: FilterCondition) -> Self {
        self.filter_conditions.push(condition);
        self
    }

    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Returns items in descending sort key order.
    pub fn descending(mut self) -> Self {
        self.scan_index_forward = Some(false);
        self
    }

    /// Checks the parameter contract. Malformed conditions are reported by the expression
    /// builder instead.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_table_name(&self.table_name)?;
        validate_limit(self.limit)?;
        validate_index_name(self.index_name.as_deref())?;

        if self.partition_key.name.trim().is_empty() {
            return Err(ValidationError::MissingPartitionKeyName);
        }
        if self.partition_key.value.is_blank() {
            return Err(ValidationError::MissingPartitionKeyValue(
                self.partition_key.name.clone(),
            ));
        }
        if let Some(sort_key) = &self.sort_key
            && sort_key.name.trim().is_empty()
        {
            return Err(ValidationError::MissingSortKeyName);
        }

        Ok(())
    }
}

/// Parameters of a full table (or index) scan.
///
/// The filter is kept in its raw expression form. Use [`ScanParams::with_filters`] to
/// compile structured conditions into it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanParams {
    pub table_name: String,
    pub limit: Option<i32>,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

impl ScanParams {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Creates a scan over `table_name` keeping only items matching all `conditions`.
    pub fn filtered(
        table_name: impl Into<String>,
        conditions: &[FilterCondition],
    ) -> Result<Self, BuilderError> {
        Self::new(table_name).with_filters(conditions)
    }

    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Compiles the given conditions into the filter expression of this scan.
    ///
    /// Replaces any filter set before. An empty list removes the filter.
    pub fn with_filters(mut self, conditions: &[FilterCondition]) -> Result<Self, BuilderError> {
        match expression::compile_filters(conditions)? {
            Some(filter) => {
                self.filter_expression = Some(filter.expression);
                self.expression_attribute_names = filter.names;
                self.expression_attribute_values = filter.values;
            }
            None => {
                self.filter_expression = None;
                self.expression_attribute_names.clear();
                self.expression_attribute_values.clear();
            }
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_table_name(&self.table_name)?;
        validate_limit(self.limit)?;
        validate_index_name(self.index_name.as_deref())?;

        if let Some(filter) = &self.filter_expression
            && filter.trim().is_empty()
        {
            return Err(ValidationError::BlankFilterExpression);
        }

        Ok(())
    }
}

fn validate_table_name(table_name: &str) -> Result<(), ValidationError> {
    if table_name.trim().is_empty() {
        Err(ValidationError::MissingTableName)
    } else {
        Ok(())
    }
}

fn validate_limit(limit: Option<i32>) -> Result<(), ValidationError> {
    match limit {
        Some(given) if !(1..=MAX_PAGE_LIMIT).contains(&given) => {
            Err(ValidationError::LimitOutOfRange {
                given,
                max: MAX_PAGE_LIMIT,
            })
        }
        _ => Ok(()),
    }
}

fn validate_index_name(index_name: Option<&str>) -> Result<(), ValidationError> {
    match index_name {
        Some(name) if name.trim().is_empty() => Err(ValidationError::EmptyIndexName),
        _ => Ok(()),
    }
}

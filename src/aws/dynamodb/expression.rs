//! Translates structured conditions into DynamoDB expressions.
//!
//! Attribute names and values never appear literally in an expression. They are bound to
//! placeholders (`#name`, `:value`) so that reserved words and special characters cannot
//! break the syntax.
//!
//! Key conditions use the fixed placeholders `#pk`, `:pk`, `#sk`, `:sk` and `:sk2`, as only
//! one partition and one sort attribute can participate. Filters may repeat attributes, so
//! [`compile_filters`] assigns `#f<n>` per distinct attribute and `:f<n>` per bound value.
//! The two schemes never overlap, which lets a query carry both in one request.

use crate::aws::dynamodb::model::{
    FilterCondition, FilterOperator, QueryParams, Scalar, SortKeyOperator,
};
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// A malformed combination of condition fields.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuilderError {
    #[error("'between' on sort key '{0}' requires an upper bound")]
    MissingSortKeyUpperBound(String),
    #[error("A filter condition needs an attribute name")]
    EmptyFilterAttribute,
    #[error("'{operator}' on '{attribute}' requires a value")]
    MissingFilterValue {
        attribute: String,
        operator: FilterOperator,
    },
    #[error("'between' on '{0}' requires an upper bound")]
    MissingFilterUpperBound(String),
}

/// An expression along with the placeholders it references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Builds the key condition of a query.
///
/// Only the partition key and the optional sort key condition are considered; filter
/// conditions are compiled separately by [`compile_filters`].
pub fn build_key_condition(params: &QueryParams) -> Result<Expression, BuilderError> {
    let mut names = HashMap::new();
    let mut values = HashMap::new();

    names.insert("#pk".to_string(), params.partition_key.name.clone());
    values.insert(
        ":pk".to_string(),
        params.partition_key.value.to_attribute_value(),
    );

    let mut expression = "#pk = :pk".to_string();

    if let Some(sort_key) = &params.sort_key {
        names.insert("#sk".to_string(), sort_key.name.clone());
        values.insert(":sk".to_string(), sort_key.value.to_attribute_value());

        let clause = match sort_key.operator {
            SortKeyOperator::Eq => "#sk = :sk".to_string(),
            SortKeyOperator::Lt => "#sk < :sk".to_string(),
            SortKeyOperator::Lte => "#sk <= :sk".to_string(),
            SortKeyOperator::Gt => "#sk > :sk".to_string(),
            SortKeyOperator::Gte => "#sk >= :sk".to_string(),
            SortKeyOperator::Between => {
                let upper = sort_key
                    .value2
                    .as_ref()
                    .ok_or_else(|| BuilderError::MissingSortKeyUpperBound(sort_key.name.clone()))?;
                values.insert(":sk2".to_string(), upper.to_attribute_value());
                "#sk BETWEEN :sk AND :sk2".to_string()
            }
            SortKeyOperator::BeginsWith => "begins_with(#sk, :sk)".to_string(),
        };

        expression.push_str(" AND ");
        expression.push_str(&clause);
    }

    Ok(Expression {
        expression,
        names,
        values,
    })
}

/// Compiles filter conditions into a single AND-joined filter expression.
///
/// Returns `None` for an empty list. Aliases are numbered in order of first appearance so
/// the same list always yields the same expression.
pub fn compile_filters(conditions: &[FilterCondition]) -> Result<Option<Expression>, BuilderError> {
    if conditions.is_empty() {
        return Ok(None);
    }

    let mut compiler = FilterCompiler::default();
    let clauses = conditions
        .iter()
        .map(|condition| compiler.clause(condition))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Expression {
        expression: clauses.join(" AND "),
        names: compiler.names,
        values: compiler.values,
    }))
}

#[derive(Default)]
struct FilterCompiler {
    aliases: HashMap<String, String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterCompiler {
    fn clause(&mut self, condition: &FilterCondition) -> Result<String, BuilderError> {
        if condition.attribute.trim().is_empty() {
            return Err(BuilderError::EmptyFilterAttribute);
        }

        let name = self.alias(&condition.attribute);

        match condition.operator {
            FilterOperator::AttributeExists => Ok(format!("attribute_exists({name})")),
            FilterOperator::AttributeNotExists => Ok(format!("attribute_not_exists({name})")),
            FilterOperator::Eq => self.comparison(&name, "=", condition),
            FilterOperator::Ne => self.comparison(&name, "<>", condition),
            FilterOperator::Lt => self.comparison(&name, "<", condition),
            FilterOperator::Lte => self.comparison(&name, "<=", condition),
            FilterOperator::Gt => self.comparison(&name, ">", condition),
            FilterOperator::Gte => self.comparison(&name, ">=", condition),
            FilterOperator::BeginsWith => {
                let value = self.bind(required_value(condition)?);
                Ok(format!("begins_with({name}, {value})"))
            }
            FilterOperator::Contains => {
                let value = self.bind(required_value(condition)?);
                Ok(format!("contains({name}, {value})"))
            }
            FilterOperator::Between => {
                let lower = required_value(condition)?;
                let upper = condition.value2.as_ref().ok_or_else(|| {
                    BuilderError::MissingFilterUpperBound(condition.attribute.clone())
                })?;

                let lower = self.bind(lower);
                let upper = self.bind(upper);
                Ok(format!("{name} BETWEEN {lower} AND {upper}"))
            }
        }
    }

    fn comparison(
        &mut self,
        name: &str,
        symbol: &str,
        condition: &FilterCondition,
    ) -> Result<String, BuilderError> {
        let value = self.bind(required_value(condition)?);
        Ok(format!("{name} {symbol} {value}"))
    }

    fn alias(&mut self, attribute: &str) -> String {
        if let Some(alias) = self.aliases.get(attribute) {
            return alias.clone();
        }

        let alias = format!("#f{}", self.aliases.len());
        self.aliases.insert(attribute.to_string(), alias.clone());
        self.names.insert(alias.clone(), attribute.to_string());
        alias
    }

    fn bind(&mut self, value: &Scalar) -> String {
        let placeholder = format!(":f{}", self.values.len());
        self.values
            .insert(placeholder.clone(), value.to_attribute_value());
        placeholder
    }
}

fn required_value(condition: &FilterCondition) -> Result<&Scalar, BuilderError> {
    condition
        .value
        .as_ref()
        .ok_or_else(|| BuilderError::MissingFilterValue {
            attribute: condition.attribute.clone(),
            operator: condition.operator,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::dynamodb::model::{PartitionKeyCondition, SortKeyCondition};

    fn query(sort_key: Option<SortKeyCondition>) -> QueryParams {
        let params = QueryParams::new("orders", PartitionKeyCondition::new("pk", "user#1"));
        match sort_key {
            Some(sort_key) => params.with_sort_key(sort_key),
            None => params,
        }
    }

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    #[test]
    fn partition_key_only() {
        let condition = build_key_condition(&query(None)).unwrap();

        assert_eq!(condition.expression, "#pk = :pk");
        assert_eq!(condition.names.len(), 1);
        assert_eq!(condition.values, HashMap::from([(":pk".to_string(), s("user#1"))]));
    }

    #[test]
    fn begins_with_sort_key() {
        let condition = build_key_condition(&query(Some(SortKeyCondition::new(
            "sk",
            SortKeyOperator::BeginsWith,
            "order#",
        ))))
        .unwrap();

        assert_eq!(condition.expression, "#pk = :pk AND begins_with(#sk, :sk)");
        assert_eq!(
            condition.names,
            HashMap::from([
                ("#pk".to_string(), "pk".to_string()),
                ("#sk".to_string(), "sk".to_string()),
            ])
        );
        assert_eq!(
            condition.values,
            HashMap::from([
                (":pk".to_string(), s("user#1")),
                (":sk".to_string(), s("order#")),
            ])
        );
    }

    #[test]
    fn comparison_operators_never_reference_the_upper_bound() {
        let cases = [
            (SortKeyOperator::Eq, "#pk = :pk AND #sk = :sk"),
            (SortKeyOperator::Lt, "#pk = :pk AND #sk < :sk"),
            (SortKeyOperator::Lte, "#pk = :pk AND #sk <= :sk"),
            (SortKeyOperator::Gt, "#pk = :pk AND #sk > :sk"),
            (SortKeyOperator::Gte, "#pk = :pk AND #sk >= :sk"),
            (SortKeyOperator::BeginsWith, "#pk = :pk AND begins_with(#sk, :sk)"),
        ];

        for (operator, expected) in cases {
            let mut sort_key = SortKeyCondition::new("sk", operator, 10);
            // An upper bound given to a non-between operator is ignored.
            sort_key.value2 = Some(Scalar::from(20));

            let condition = build_key_condition(&query(Some(sort_key))).unwrap();
            assert_eq!(condition.expression, expected);
            assert!(!condition.expression.contains(":sk2"));
            assert!(!condition.values.contains_key(":sk2"));
        }
    }

    #[test]
    fn between_binds_both_bounds() {
        let condition =
            build_key_condition(&query(Some(SortKeyCondition::between("sk", 10, 20)))).unwrap();

        assert_eq!(condition.expression, "#pk = :pk AND #sk BETWEEN :sk AND :sk2");
        assert_eq!(condition.values[":sk"], AttributeValue::N("10".to_string()));
        assert_eq!(condition.values[":sk2"], AttributeValue::N("20".to_string()));
    }

    #[test]
    fn between_without_upper_bound_fails() {
        let result = build_key_condition(&query(Some(SortKeyCondition::new(
            "sk",
            SortKeyOperator::Between,
            10,
        ))));

        assert_eq!(
            result,
            Err(BuilderError::MissingSortKeyUpperBound("sk".to_string()))
        );
    }

    #[test]
    fn key_condition_is_deterministic() {
        let params = query(Some(SortKeyCondition::between("sk", "a", "m")));
        assert_eq!(
            build_key_condition(&params).unwrap(),
            build_key_condition(&params).unwrap()
        );
    }

    #[test]
    fn empty_filter_list_yields_nothing() {
        assert_eq!(compile_filters(&[]), Ok(None));
    }

    #[test]
    fn filters_share_aliases_per_attribute() {
        let filter = compile_filters(&[
            FilterCondition::new("price", FilterOperator::Gte, 10),
            FilterCondition::new("status", FilterOperator::Ne, "closed"),
            FilterCondition::new("price", FilterOperator::Lt, 100),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(
            filter.expression,
            "#f0 >= :f0 AND #f1 <> :f1 AND #f0 < :f2"
        );
        assert_eq!(
            filter.names,
            HashMap::from([
                ("#f0".to_string(), "price".to_string()),
                ("#f1".to_string(), "status".to_string()),
            ])
        );
        assert_eq!(filter.values.len(), 3);
        assert_eq!(filter.values[":f2"], AttributeValue::N("100".to_string()));
    }

    #[test]
    fn filters_render_every_operator() {
        let filter = compile_filters(&[
            FilterCondition::new("a", FilterOperator::Eq, 1),
            FilterCondition::new("b", FilterOperator::Lte, 2),
            FilterCondition::new("c", FilterOperator::Gt, 3),
            FilterCondition::between("d", 4, 5),
            FilterCondition::new("e", FilterOperator::BeginsWith, "x"),
            FilterCondition::new("f", FilterOperator::Contains, "y"),
            FilterCondition::exists("g"),
            FilterCondition::not_exists("h"),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(
            filter.expression,
            "#f0 = :f0 AND #f1 <= :f1 AND #f2 > :f2 AND #f3 BETWEEN :f3 AND :f4 \
             AND begins_with(#f4, :f5) AND contains(#f5, :f6) \
             AND attribute_exists(#f6) AND attribute_not_exists(#f7)"
        );
        assert_eq!(filter.names.len(), 8);
        assert_eq!(filter.values.len(), 7);
    }

    #[test]
    fn existence_checks_ignore_values() {
        let mut condition = FilterCondition::exists("deleted");
        condition.value = Some(Scalar::from(true));

        let filter = compile_filters(&[condition]).unwrap().unwrap();
        assert_eq!(filter.expression, "attribute_exists(#f0)");
        assert!(filter.values.is_empty());
    }

    #[test]
    fn malformed_filters_fail() {
        let mut missing_value = FilterCondition::new("a", FilterOperator::Eq, 1);
        missing_value.value = None;
        assert_eq!(
            compile_filters(&[missing_value]),
            Err(BuilderError::MissingFilterValue {
                attribute: "a".to_string(),
                operator: FilterOperator::Eq,
            })
        );

        let mut missing_upper = FilterCondition::between("a", 1, 2);
        missing_upper.value2 = None;
        assert_eq!(
            compile_filters(&[missing_upper]),
            Err(BuilderError::MissingFilterUpperBound("a".to_string()))
        );

        assert_eq!(
            compile_filters(&[FilterCondition::exists(" ")]),
            Err(BuilderError::EmptyFilterAttribute)
        );
    }

    #[test]
    fn filter_placeholders_never_collide_with_key_placeholders() {
        let params = query(Some(SortKeyCondition::between("sk", 1, 2)))
            .with_filter(FilterCondition::new("pk", FilterOperator::Ne, "x"));

        let key = build_key_condition(&params).unwrap();
        let filter = compile_filters(&params.filter_conditions).unwrap().unwrap();

        assert!(key.names.keys().all(|name| !filter.names.contains_key(name)));
        assert!(key.values.keys().all(|value| !filter.values.contains_key(value)));
    }
}

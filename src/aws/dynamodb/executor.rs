//! Single-request operations against a table.
//!
//! Each executor validates its parameters locally, obtains the current connection from a
//! [`ConnectionCache`], issues exactly one request and normalizes the response. Retries are
//! left to the SDK's transport policy.
//!
//! Every executor takes a [`CancellationToken`]. Cancelling it drops the in-flight request
//! and yields [`ExecError::Cancelled`].

use crate::aws::dynamodb::client::{QueryRequest, ScanRequest, StoreFault};
use crate::aws::dynamodb::connection::{ConnectionCache, ConnectionConfig};
use crate::aws::dynamodb::expression::{self, BuilderError};
use crate::aws::dynamodb::model::{
    Item, MAX_TABLE_LIST_LIMIT, QueryParams, ScanParams, ValidationError,
};
use crate::aws::dynamodb::schema::TableInfo;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::scan::ScanOutput;
use aws_sdk_dynamodb::types::TableDescription;
use futures_util::{Stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// The ways an executor can fail.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreFault),
    #[error(transparent)]
    Connection(#[from] anyhow::Error),
    #[error("The request was cancelled")]
    Cancelled,
}

/// Marks where the next page of a scan or query starts.
///
/// The key is handed back to DynamoDB unchanged and is intentionally not inspectable.
#[derive(Clone, PartialEq)]
pub struct Cursor(Item);

impl Cursor {
    fn into_key(self) -> Item {
        self.0
    }
}

impl Debug for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.0.keys().collect::<Vec<_>>();
        keys.sort();
        write!(f, "Cursor({:?})", keys)
    }
}

/// One normalized page of a scan or query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Number of items returned after filtering.
    pub count: u64,
    /// Number of items read before filtering.
    pub scanned_count: u64,
    pub cursor: Option<Cursor>,
}

pub type ScanResult = Page;
pub type QueryResult = Page;

impl Page {
    fn from_scan(output: ScanOutput) -> Self {
        Page {
            count: non_negative(output.count),
            scanned_count: non_negative(output.scanned_count),
            items: output.items.unwrap_or_default(),
            cursor: output.last_evaluated_key.map(Cursor),
        }
    }

    fn from_query(output: QueryOutput) -> Self {
        Page {
            count: non_negative(output.count),
            scanned_count: non_negative(output.scanned_count),
            items: output.items.unwrap_or_default(),
            cursor: output.last_evaluated_key.map(Cursor),
        }
    }

    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

fn non_negative(count: i32) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// One page of table names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TablePage {
    pub tables: Vec<String>,
    /// The name to continue after, if more tables exist.
    pub last_table_name: Option<String>,
}

impl TablePage {
    pub fn has_more(&self) -> bool {
        self.last_table_name.is_some()
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, ExecError>>,
) -> Result<T, ExecError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecError::Cancelled),
        result = work => result,
    }
}

fn non_empty<K, V>(map: HashMap<K, V>) -> Option<HashMap<K, V>> {
    if map.is_empty() { None } else { Some(map) }
}

/// Reads one page of a table or index.
#[tracing::instrument(level = "debug", skip_all, fields(table = %params.table_name), err(Display))]
pub async fn scan(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    params: &ScanParams,
    start: Option<Cursor>,
    cancel: &CancellationToken,
) -> Result<ScanResult, ExecError> {
    params.validate()?;

    let request = ScanRequest {
        table_name: params.table_name.clone(),
        index_name: params.index_name.clone(),
        filter_expression: params.filter_expression.clone(),
        expression_attribute_names: non_empty(params.expression_attribute_names.clone()),
        expression_attribute_values: non_empty(params.expression_attribute_values.clone()),
        limit: params.limit,
        exclusive_start_key: start.map(Cursor::into_key),
    };

    cancellable(cancel, async {
        let connection = connections.get_connection(config).await?;
        let output = connection.backend().scan(request).await?;
        let page = Page::from_scan(output);
        tracing::debug!(
            count = page.count,
            scanned_count = page.scanned_count,
            has_more = page.has_more(),
            "Scanned page"
        );

        Ok(page)
    })
    .await
}

/// Reads one page of a single partition.
#[tracing::instrument(level = "debug", skip_all, fields(table = %params.table_name), err(Display))]
pub async fn query(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    params: &QueryParams,
    start: Option<Cursor>,
    cancel: &CancellationToken,
) -> Result<QueryResult, ExecError> {
    let request = build_query_request(params, start)?;

    cancellable(cancel, async {
        let connection = connections.get_connection(config).await?;
        let output = connection.backend().query(request).await?;
        let page = Page::from_query(output);
        tracing::debug!(
            count = page.count,
            scanned_count = page.scanned_count,
            has_more = page.has_more(),
            "Queried page"
        );

        Ok(page)
    })
    .await
}

fn build_query_request(
    params: &QueryParams,
    start: Option<Cursor>,
) -> Result<QueryRequest, ExecError> {
    params.validate()?;

    let key = expression::build_key_condition(params)?;
    let mut names = key.names;
    let mut values = key.values;

    let filter_expression =
        expression::compile_filters(&params.filter_conditions)?.map(|filter| {
            names.extend(filter.names);
            values.extend(filter.values);
            filter.expression
        });

    Ok(QueryRequest {
        table_name: params.table_name.clone(),
        index_name: params.index_name.clone(),
        key_condition_expression: key.expression,
        filter_expression,
        expression_attribute_names: non_empty(names),
        expression_attribute_values: non_empty(values),
        limit: params.limit,
        scan_index_forward: params.scan_index_forward,
        exclusive_start_key: start.map(Cursor::into_key),
    })
}

/// Lists one page of table names, continuing after `start` if given.
///
/// `page_limit` defaults to (and may not exceed) 100.
#[tracing::instrument(level = "debug", skip(connections, cancel), err(Display))]
pub async fn list_tables(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    start: Option<String>,
    page_limit: Option<i32>,
    cancel: &CancellationToken,
) -> Result<TablePage, ExecError> {
    let limit = page_limit.unwrap_or(MAX_TABLE_LIST_LIMIT);
    if !(1..=MAX_TABLE_LIST_LIMIT).contains(&limit) {
        return Err(ValidationError::LimitOutOfRange {
            given: limit,
            max: MAX_TABLE_LIST_LIMIT,
        }
        .into());
    }

    cancellable(cancel, async {
        let connection = connections.get_connection(config).await?;
        let output = connection.backend().list_tables(start, limit).await?;

        Ok(TablePage {
            tables: output.table_names.unwrap_or_default(),
            last_table_name: output.last_evaluated_table_name,
        })
    })
    .await
}

/// Returns a stream of all table names, fetching further pages on demand.
pub fn stream_tables<'a>(
    connections: &'a ConnectionCache,
    config: &'a ConnectionConfig,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Stream<Item = Result<String, ExecError>> + Send + 'a>> {
    enum ListingState {
        Start,
        After(String),
        End,
    }

    futures_util::stream::try_unfold(ListingState::Start, move |state| async move {
        let start = match state {
            ListingState::Start => None,
            ListingState::After(name) => Some(name),
            ListingState::End => return Ok::<_, ExecError>(None),
        };

        let page = list_tables(connections, config, start, None, cancel).await?;
        let next_state = match page.last_table_name {
            Some(name) => ListingState::After(name),
            None => ListingState::End,
        };

        Ok(Some((page.tables, next_state)))
    })
    .map_ok(|tables| futures_util::stream::iter(tables.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

/// Collects the names of all tables.
pub async fn list_all_tables(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ExecError> {
    stream_tables(connections, config, cancel).try_collect().await
}

/// Fetches the raw description of a table.
#[tracing::instrument(level = "debug", skip(connections, config, cancel), err(Display))]
pub async fn describe_table(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    table_name: &str,
    cancel: &CancellationToken,
) -> Result<TableDescription, ExecError> {
    if table_name.trim().is_empty() {
        return Err(ValidationError::MissingTableName.into());
    }

    cancellable(cancel, async {
        let connection = connections.get_connection(config).await?;
        let output = match connection.backend().describe_table(table_name).await {
            Ok(output) => output,
            Err(fault) if fault.is_resource_not_found() => {
                return Err(ExecError::TableNotFound(table_name.to_string()));
            }
            Err(fault) => return Err(fault.into()),
        };

        output
            .table
            .ok_or_else(|| ExecError::TableNotFound(table_name.to_string()))
    })
    .await
}

/// Describes a table in terms of its keys and usable indexes.
pub async fn get_table_info(
    connections: &ConnectionCache,
    config: &ConnectionConfig,
    table_name: &str,
    cancel: &CancellationToken,
) -> Result<TableInfo, ExecError> {
    let description = describe_table(connections, config, table_name, cancel).await?;
    Ok(TableInfo::from_description(&description))
}

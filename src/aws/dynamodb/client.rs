//! The seam between the executors and DynamoDB itself.
//!
//! [`StoreBackend`] mirrors the four SDK operations this crate needs, each taking a plain
//! request struct and returning the raw SDK output. [`DynamoClient`] forwards them to the
//! AWS SDK, tests swap in an in-memory backend.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::describe_table::DescribeTableOutput;
use aws_sdk_dynamodb::operation::list_tables::ListTablesOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::scan::ScanOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::error::Error;

/// A `Scan` request as sent over the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<HashMap<String, AttributeValue>>,
}

/// A `Query` request as sent over the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    pub limit: Option<i32>,
    pub scan_index_forward: Option<bool>,
    pub exclusive_start_key: Option<HashMap<String, AttributeValue>>,
}

/// An error reported by DynamoDB or by the transport in front of it.
///
/// `code` carries the service's error identifier (e.g. `ThrottlingException`) and is
/// `None` for failures that never produced a service response.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreFault {
    pub code: Option<String>,
    pub message: String,
}

impl StoreFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_resource_not_found(&self) -> bool {
        self.code.as_deref() == Some("ResourceNotFoundException")
    }

    fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + Error + 'static,
    {
        let code = err.code().map(str::to_owned);
        let message = err
            .message()
            .map(str::to_owned)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

        Self { code, message }
    }
}

/// The store operations used by the executors.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, StoreFault>;

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreFault>;

    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: i32,
    ) -> Result<ListTablesOutput, StoreFault>;

    async fn describe_table(&self, table_name: &str) -> Result<DescribeTableOutput, StoreFault>;
}

/// [`StoreBackend`] talking to DynamoDB through the AWS SDK.
#[derive(Clone, Debug)]
pub struct DynamoClient {
    /// The underlying AWS SDK DynamoDB client.
    pub client: Client,
}

impl DynamoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoreBackend for DynamoClient {
    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, StoreFault> {
        self.client
            .scan()
            .table_name(request.table_name)
            .set_index_name(request.index_name)
            .set_filter_expression(request.filter_expression)
            .set_expression_attribute_names(request.expression_attribute_names)
            .set_expression_attribute_values(request.expression_attribute_values)
            .set_limit(request.limit)
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await
            .map_err(StoreFault::from_sdk)
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreFault> {
        self.client
            .query()
            .table_name(request.table_name)
            .set_index_name(request.index_name)
            .key_condition_expression(request.key_condition_expression)
            .set_filter_expression(request.filter_expression)
            .set_expression_attribute_names(request.expression_attribute_names)
            .set_expression_attribute_values(request.expression_attribute_values)
            .set_limit(request.limit)
            .set_scan_index_forward(request.scan_index_forward)
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await
            .map_err(StoreFault::from_sdk)
    }

    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: i32,
    ) -> Result<ListTablesOutput, StoreFault> {
        self.client
            .list_tables()
            .set_exclusive_start_table_name(exclusive_start_table_name)
            .limit(limit)
            .send()
            .await
            .map_err(StoreFault::from_sdk)
    }

    async fn describe_table(&self, table_name: &str) -> Result<DescribeTableOutput, StoreFault> {
        self.client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(StoreFault::from_sdk)
    }
}

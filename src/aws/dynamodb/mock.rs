//! In-memory store used by the unit tests.

use crate::aws::dynamodb::client::{QueryRequest, ScanRequest, StoreBackend, StoreFault};
use crate::aws::dynamodb::connection::{ConnectionConfig, Connector};
use crate::aws::dynamodb::model::Item;
use async_trait::async_trait;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableOutput;
use aws_sdk_dynamodb::operation::list_tables::ListTablesOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::scan::ScanOutput;
use aws_sdk_dynamodb::types::{AttributeValue, TableDescription};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot};

/// Replays scripted responses and records every request it receives.
///
/// Unscripted scans, queries and table listings answer with an empty result, unknown tables
/// with a `ResourceNotFoundException`.
#[derive(Default)]
pub struct MockBackend {
    scans: Mutex<VecDeque<Result<ScanOutput, StoreFault>>>,
    queries: Mutex<VecDeque<Result<QueryOutput, StoreFault>>>,
    table_lists: Mutex<VecDeque<Result<ListTablesOutput, StoreFault>>>,
    tables: Mutex<HashMap<String, TableDescription>>,
    describe_faults: Mutex<HashMap<String, StoreFault>>,

    pub scan_requests: Mutex<Vec<ScanRequest>>,
    pub query_requests: Mutex<Vec<QueryRequest>>,
    pub list_requests: Mutex<Vec<(Option<String>, i32)>>,
    pub describe_requests: Mutex<Vec<String>>,

    gate: Mutex<Option<oneshot::Receiver<()>>>,
    entered_count: AtomicUsize,
    entered: Notify,
}

impl MockBackend {
    pub fn push_scan(&self, response: Result<ScanOutput, StoreFault>) -> &Self {
        self.scans.lock().unwrap().push_back(response);
        self
    }

    pub fn push_query(&self, response: Result<QueryOutput, StoreFault>) -> &Self {
        self.queries.lock().unwrap().push_back(response);
        self
    }

    pub fn push_table_list(&self, response: Result<ListTablesOutput, StoreFault>) -> &Self {
        self.table_lists.lock().unwrap().push_back(response);
        self
    }

    pub fn put_table(&self, description: TableDescription) -> &Self {
        let name = description.table_name().unwrap_or_default().to_string();
        self.tables.lock().unwrap().insert(name, description);
        self
    }

    /// Makes every describe of `table_name` fail with `fault`.
    pub fn fail_describe(&self, table_name: &str, fault: StoreFault) -> &Self {
        self.describe_faults
            .lock()
            .unwrap()
            .insert(table_name.to_string(), fault);
        self
    }

    /// Holds the next scan or query until the returned sender fires (or is dropped).
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn scan_count(&self) -> usize {
        self.scan_requests.lock().unwrap().len()
    }

    pub fn last_scan(&self) -> ScanRequest {
        self.scan_requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_query(&self) -> QueryRequest {
        self.query_requests.lock().unwrap().last().cloned().unwrap()
    }

    /// Waits until at least `requests` scans or queries have been received.
    pub async fn wait_entered(&self, requests: usize) {
        loop {
            let notified = self.entered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.entered_count.load(Ordering::SeqCst) >= requests {
                return;
            }
            notified.await;
        }
    }

    async fn pass_gate(&self) {
        self.entered_count.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_waiters();
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl StoreBackend for MockBackend {
    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, StoreFault> {
        self.scan_requests.lock().unwrap().push(request);
        let response = self.scans.lock().unwrap().pop_front();
        self.pass_gate().await;
        response.unwrap_or_else(|| Ok(ScanOutput::builder().build()))
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput, StoreFault> {
        self.query_requests.lock().unwrap().push(request);
        let response = self.queries.lock().unwrap().pop_front();
        self.pass_gate().await;
        response.unwrap_or_else(|| Ok(QueryOutput::builder().build()))
    }

    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: i32,
    ) -> Result<ListTablesOutput, StoreFault> {
        self.list_requests
            .lock()
            .unwrap()
            .push((exclusive_start_table_name, limit));
        let response = self.table_lists.lock().unwrap().pop_front();
        response.unwrap_or_else(|| Ok(ListTablesOutput::builder().build()))
    }

    async fn describe_table(&self, table_name: &str) -> Result<DescribeTableOutput, StoreFault> {
        self.describe_requests
            .lock()
            .unwrap()
            .push(table_name.to_string());
        if let Some(fault) = self.describe_faults.lock().unwrap().get(table_name) {
            return Err(fault.clone());
        }
        match self.tables.lock().unwrap().get(table_name) {
            Some(description) => Ok(DescribeTableOutput::builder()
                .table(description.clone())
                .build()),
            None => Err(StoreFault::new(
                "ResourceNotFoundException",
                format!("Requested resource not found: Table: {} not found", table_name),
            )),
        }
    }
}

/// Hands out the same [`MockBackend`] for every config and counts the setups.
pub struct MockConnector {
    backend: Option<Arc<MockBackend>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self {
            backend: Some(backend),
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose every setup fails.
    pub fn failing() -> Self {
        Self {
            backend: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> anyhow::Result<Arc<dyn StoreBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        match &self.backend {
            Some(backend) => Ok(backend.clone()),
            None => Err(anyhow::anyhow!("no credentials")),
        }
    }
}

pub fn item(id: &str) -> Item {
    HashMap::from([
        ("pk".to_string(), AttributeValue::S(id.to_string())),
        ("n".to_string(), AttributeValue::N("1".to_string())),
    ])
}

pub fn cursor_key(id: &str) -> Item {
    HashMap::from([("pk".to_string(), AttributeValue::S(id.to_string()))])
}

/// A scan page of `count` items named `<prefix>-<n>`, continuing after `next` if given.
pub fn scan_page(prefix: &str, count: usize, next: Option<&str>) -> ScanOutput {
    let items = (0..count)
        .map(|n| item(&format!("{}-{}", prefix, n)))
        .collect::<Vec<_>>();

    ScanOutput::builder()
        .set_items(Some(items))
        .count(count as i32)
        .scanned_count(count as i32 * 2)
        .set_last_evaluated_key(next.map(cursor_key))
        .build()
}

pub fn query_page(prefix: &str, count: usize, next: Option<&str>) -> QueryOutput {
    let items = (0..count)
        .map(|n| item(&format!("{}-{}", prefix, n)))
        .collect::<Vec<_>>();

    QueryOutput::builder()
        .set_items(Some(items))
        .count(count as i32)
        .scanned_count(count as i32)
        .set_last_evaluated_key(next.map(cursor_key))
        .build()
}

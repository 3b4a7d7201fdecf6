//! Incremental fetching of scan or query results.
//!
//! A [`PaginatedFetch`] accumulates the pages of one request, following the continuation
//! cursor one [`PaginatedFetch::fetch_next`] at a time. Its state lives behind a plain mutex
//! which is never held while a request is in flight:
//!
//! 1. `fetch_next` takes a ticket (generation, request, cursor) under the lock and marks the
//!    controller as fetching,
//! 2. runs the request without the lock,
//! 3. commits the page under the lock again, but only if the generation is still the one on
//!    the ticket.
//!
//! Every [`reset`](PaginatedFetch::reset), [`refresh`](PaginatedFetch::refresh),
//! [`clear`](PaginatedFetch::clear) and [`abort`](PaginatedFetch::abort) bumps the generation
//! and cancels the request in flight, so a late response can never overwrite newer state.
//! Dropping a `fetch_next` or `refresh` future before it completes does the same as `abort`.

use crate::aws::dynamodb::connection::{ConnectionCache, ConnectionConfig};
use crate::aws::dynamodb::errors::{ParsedError, classify};
use crate::aws::dynamodb::executor::{self, Cursor, ExecError, Page};
use crate::aws::dynamodb::expression;
use crate::aws::dynamodb::model::{Item, QueryParams, ScanParams};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// What to fetch page by page.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchRequest {
    Scan(ScanParams),
    Query(QueryParams),
}

impl FetchRequest {
    pub fn table_name(&self) -> &str {
        match self {
            FetchRequest::Scan(params) => &params.table_name,
            FetchRequest::Query(params) => &params.table_name,
        }
    }

    /// Runs every local check the executor would run, including expression building.
    pub fn validate(&self) -> Result<(), ExecError> {
        match self {
            FetchRequest::Scan(params) => params.validate()?,
            FetchRequest::Query(params) => {
                params.validate()?;
                expression::build_key_condition(params)?;
                expression::compile_filters(&params.filter_conditions)?;
            }
        }

        Ok(())
    }
}

impl From<ScanParams> for FetchRequest {
    fn from(params: ScanParams) -> Self {
        FetchRequest::Scan(params)
    }
}

impl From<QueryParams> for FetchRequest {
    fn from(params: QueryParams) -> Self {
        FetchRequest::Query(params)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
    Idle,
    Fetching,
    Errored(ParsedError),
}

/// The result of a single [`PaginatedFetch::fetch_next`].
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// A page was appended.
    Fetched { added: usize },
    /// The last page was already fetched, no request was made.
    Exhausted,
    /// Another fetch is still in flight, no request was made.
    Busy,
    /// The controller was reset while the request was in flight. Its result was dropped.
    Stale,
    /// The request failed. Accumulated items are unchanged.
    Failed(ParsedError),
    /// Nothing to fetch, the controller has no request.
    Detached,
}

/// A snapshot of a controller's state for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageView {
    pub items: Vec<Item>,
    pub is_loading: bool,
    pub error: Option<ParsedError>,
    pub has_more: bool,
    pub count: u64,
    pub scanned_count: u64,
    pub generation: u64,
    pub table_name: Option<String>,
}

struct Target {
    request: FetchRequest,
    config: ConnectionConfig,
}

struct PaginationState {
    generation: u64,
    target: Option<Target>,
    cursor: Option<Cursor>,
    has_more: bool,
    items: Vec<Item>,
    count_total: u64,
    scanned_count_total: u64,
    phase: Phase,
    cancel: CancellationToken,
}

impl PaginationState {
    fn new() -> Self {
        Self {
            generation: 0,
            target: None,
            cursor: None,
            has_more: true,
            items: Vec::new(),
            count_total: 0,
            scanned_count_total: 0,
            phase: Phase::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Starts a new generation, dropping everything fetched so far.
    fn restart(&mut self) {
        self.supersede();
        self.cursor = None;
        self.has_more = true;
        self.items.clear();
        self.count_total = 0;
        self.scanned_count_total = 0;
    }

    /// Fences off the request in flight (if any).
    fn supersede(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.phase = Phase::Idle;
    }

    fn begin(&mut self) -> Result<Ticket, FetchOutcome> {
        let Some(target) = &self.target else {
            return Err(FetchOutcome::Detached);
        };
        if self.phase == Phase::Fetching {
            return Err(FetchOutcome::Busy);
        }
        if !self.has_more {
            return Err(FetchOutcome::Exhausted);
        }

        self.phase = Phase::Fetching;

        Ok(Ticket {
            generation: self.generation,
            request: target.request.clone(),
            config: target.config.clone(),
            cursor: self.cursor.clone(),
            cancel: self.cancel.clone(),
        })
    }

    fn commit(&mut self, generation: u64, result: Result<Page, ExecError>) -> FetchOutcome {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "Discarding response of a superseded fetch"
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(page) => {
                let added = page.items.len();
                self.items.extend(page.items);
                self.count_total += page.count;
                self.scanned_count_total += page.scanned_count;
                self.has_more = page.cursor.is_some();
                self.cursor = page.cursor;
                self.phase = Phase::Idle;

                FetchOutcome::Fetched { added }
            }
            Err(err) => {
                let parsed = classify(&err);
                tracing::warn!(generation, "Failed to fetch page: {}", err);
                self.phase = Phase::Errored(parsed.clone());

                FetchOutcome::Failed(parsed)
            }
        }
    }
}

struct Ticket {
    generation: u64,
    request: FetchRequest,
    config: ConnectionConfig,
    cursor: Option<Cursor>,
    cancel: CancellationToken,
}

impl Ticket {
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            table = self.request.table_name(),
            generation = self.generation,
            cursor = ?self.cursor,
        )
    )]
    async fn run(self, connections: &ConnectionCache) -> (u64, Result<Page, ExecError>) {
        let result = match &self.request {
            FetchRequest::Scan(params) => {
                executor::scan(connections, &self.config, params, self.cursor, &self.cancel)
                    .await
            }
            FetchRequest::Query(params) => {
                executor::query(connections, &self.config, params, self.cursor, &self.cancel)
                    .await
            }
        };

        (self.generation, result)
    }
}

/// Releases the fetching phase if a fetch future is dropped before its response is committed.
struct InFlight<'a> {
    fetch: &'a PaginatedFetch,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut state = self.fetch.lock();
        if state.generation == self.generation {
            tracing::debug!(
                generation = self.generation,
                "Fetch dropped while in flight"
            );
            state.supersede();
        }
    }
}

/// Pages through the results of one scan or query.
pub struct PaginatedFetch {
    connections: Arc<ConnectionCache>,
    state: Mutex<PaginationState>,
}

impl PaginatedFetch {
    pub fn new(connections: Arc<ConnectionCache>) -> Self {
        Self {
            connections,
            state: Mutex::new(PaginationState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaginationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switches to a new request and drops all accumulated results.
    ///
    /// An invalid request is rejected and leaves the controller untouched.
    pub fn reset(
        &self,
        request: impl Into<FetchRequest>,
        config: ConnectionConfig,
    ) -> Result<(), ExecError> {
        let request = request.into();
        request.validate()?;

        let mut state = self.lock();
        state.restart();
        state.target = Some(Target { request, config });

        Ok(())
    }

    /// Fetches the page after the last one fetched.
    ///
    /// After a failure, this retries the page that failed.
    pub async fn fetch_next(&self) -> FetchOutcome {
        let ticket = self.lock().begin();
        self.run(ticket).await
    }

    /// Starts over with the current request and fetches its first page.
    pub async fn refresh(&self) -> FetchOutcome {
        let ticket = {
            let mut state = self.lock();
            if state.target.is_none() {
                return FetchOutcome::Detached;
            }
            state.restart();
            state.begin()
        };

        self.run(ticket).await
    }

    /// Switches to a new request and fetches its first page.
    pub async fn refresh_with(
        &self,
        request: impl Into<FetchRequest>,
        config: ConnectionConfig,
    ) -> Result<FetchOutcome, ExecError> {
        let request = request.into();
        request.validate()?;

        let ticket = {
            let mut state = self.lock();
            state.restart();
            state.target = Some(Target { request, config });
            state.begin()
        };

        Ok(self.run(ticket).await)
    }

    async fn run(&self, ticket: Result<Ticket, FetchOutcome>) -> FetchOutcome {
        match ticket {
            Ok(ticket) => {
                let mut in_flight = InFlight {
                    fetch: self,
                    generation: ticket.generation,
                    settled: false,
                };
                let (generation, result) = ticket.run(&self.connections).await;
                in_flight.settled = true;
                self.lock().commit(generation, result)
            }
            Err(outcome) => outcome,
        }
    }

    /// Detaches from the current request and drops all results.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.restart();
        state.target = None;
    }

    /// Cancels the fetch in flight but keeps everything fetched so far.
    ///
    /// The next [`fetch_next`](PaginatedFetch::fetch_next) requests the aborted page again.
    pub fn abort(&self) {
        self.lock().supersede();
    }

    pub fn view(&self) -> PageView {
        let state = self.lock();
        PageView {
            items: state.items.clone(),
            is_loading: state.phase == Phase::Fetching,
            error: match &state.phase {
                Phase::Errored(err) => Some(err.clone()),
                _ => None,
            },
            has_more: state.has_more,
            count: state.count_total,
            scanned_count: state.scanned_count_total,
            generation: state.generation,
            table_name: state
                .target
                .as_ref()
                .map(|target| target.request.table_name().to_string()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }
}

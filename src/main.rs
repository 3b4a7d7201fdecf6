//! Command line front end for browsing DynamoDB tables.
//!
//! Items are printed to stdout as one JSON object per line, everything else goes to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dynoscope::aws::dynamodb::connection::ConnectionCache;
use dynoscope::aws::dynamodb::errors::classify_anyhow;
use dynoscope::aws::dynamodb::executor;
use dynoscope::aws::dynamodb::item::item_to_json;
use dynoscope::aws::dynamodb::metadata::TableMetadataCache;
use dynoscope::aws::dynamodb::model::{
    FilterCondition, FilterOperator, PartitionKeyCondition, QueryParams, Scalar, ScanParams,
    SortKeyCondition, SortKeyOperator,
};
use dynoscope::aws::dynamodb::pagination::{FetchOutcome, FetchRequest, PaginatedFetch};
use dynoscope::config::Settings;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "dynoscope", version)]
#[command(about = "Browse DynamoDB tables from the terminal", long_about = None)]
struct Args {
    /// Credential profile (overrides DYNOSCOPE_PROFILE / AWS_PROFILE).
    #[arg(long, global = true)]
    profile: Option<String>,
    /// Region (overrides DYNOSCOPE_REGION / AWS_REGION).
    #[arg(long, global = true)]
    region: Option<String>,
    /// Endpoint override, e.g. http://localhost:8000 for DynamoDB Local.
    #[arg(long, global = true)]
    endpoint_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all tables.
    Tables,
    /// Show the key schema and usable indexes of a table.
    Describe { table: String },
    /// Scan a table or index.
    Scan {
        table: String,
        /// Scan this secondary index instead of the table.
        #[arg(long)]
        index: Option<String>,
        /// Filter as "attribute operator [value [value2]]", may be repeated.
        #[arg(long = "where")]
        filters: Vec<String>,
        /// Items read per request (defaults to DYNOSCOPE_PAGE_SIZE).
        #[arg(long)]
        limit: Option<i32>,
        /// Number of pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Query one partition of a table or index.
    Query {
        table: String,
        /// Partition key value.
        #[arg(long)]
        pk: String,
        /// Sort key condition as "operator value [value2]", e.g. "begins_with order#".
        #[arg(long)]
        sk: Option<String>,
        /// Query this secondary index instead of the table.
        #[arg(long)]
        index: Option<String>,
        /// Filter as "attribute operator [value [value2]]", may be repeated.
        #[arg(long = "where")]
        filters: Vec<String>,
        /// Return items in descending sort key order.
        #[arg(long, default_value_t = false)]
        descending: bool,
        /// Items read per request (defaults to DYNOSCOPE_PAGE_SIZE).
        #[arg(long)]
        limit: Option<i32>,
        /// Number of pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
}

struct App {
    settings: Settings,
    connections: Arc<ConnectionCache>,
    metadata: TableMetadataCache,
    cancel: CancellationToken,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dynoscope::logging::setup_tracing();

    let settings = Settings::from_env().overridden(args.profile, args.region, args.endpoint_url);
    let connections = Arc::new(ConnectionCache::with_sdk());
    let app = App {
        settings,
        metadata: TableMetadataCache::new(connections.clone()),
        connections,
        cancel: CancellationToken::new(),
    };

    let cancel = app.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling...");
            cancel.cancel();
        }
    });

    if let Err(err) = app.run(args.command).await {
        let parsed = classify_anyhow(&err);
        tracing::debug!("{:#}", err);
        eprintln!("Error: {}", parsed);
        eprintln!("Hint: {}", parsed.guidance());
        std::process::exit(1);
    }
}

impl App {
    async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Tables => self.tables().await,
            Command::Describe { table } => self.describe(&table).await,
            Command::Scan {
                table,
                index,
                filters,
                limit,
                pages,
            } => {
                let conditions = parse_filters(&filters)?;
                let mut params = ScanParams::filtered(table, &conditions)?
                    .with_limit(limit.unwrap_or(self.settings.page_size));
                if let Some(index) = index {
                    params = params.on_index(index);
                }

                self.fetch(FetchRequest::Scan(params), pages).await
            }
            Command::Query {
                table,
                pk,
                sk,
                index,
                filters,
                descending,
                limit,
                pages,
            } => {
                let info = self
                    .metadata
                    .get_table_info(&self.settings.connection, &table, &self.cancel)
                    .await?;
                let (partition_key, sort_key) =
                    info.key_for(index.as_deref()).with_context(|| {
                        format!(
                            "Table '{}' has no active index '{}'",
                            table,
                            index.as_deref().unwrap_or_default()
                        )
                    })?;

                let mut params = QueryParams::new(
                    table.as_str(),
                    PartitionKeyCondition::new(partition_key, Scalar::infer(&pk)),
                )
                .with_limit(limit.unwrap_or(self.settings.page_size));

                if let Some(sk) = sk {
                    let sort_key = sort_key
                        .with_context(|| format!("'{}' has no sort key to filter on", table))?;
                    params = params.with_sort_key(parse_sort_key(sort_key, &sk)?);
                }
                for condition in parse_filters(&filters)? {
                    params = params.with_filter(condition);
                }
                if let Some(index) = index {
                    params = params.on_index(index);
                }
                if descending {
                    params = params.descending();
                }

                self.fetch(FetchRequest::Query(params), pages).await
            }
        }
    }

    async fn tables(&self) -> anyhow::Result<()> {
        let mut tables =
            executor::stream_tables(&self.connections, &self.settings.connection, &self.cancel);
        while let Some(table) = tables.next().await {
            println!("{}", table?);
        }

        Ok(())
    }

    async fn describe(&self, table: &str) -> anyhow::Result<()> {
        let info = self
            .metadata
            .get_table_info(&self.settings.connection, table, &self.cancel)
            .await?;

        println!("{}", serde_json::to_string_pretty(info.as_ref())?);
        eprintln!("{} items, {}", info.item_count, info.display_size());

        Ok(())
    }

    async fn fetch(&self, request: FetchRequest, pages: usize) -> anyhow::Result<()> {
        let fetch = PaginatedFetch::new(self.connections.clone());
        fetch.reset(request, self.settings.connection.clone())?;

        let mut printed = 0;
        for _ in 0..pages {
            let outcome = tokio::select! {
                outcome = fetch.fetch_next() => outcome,
                _ = self.cancel.cancelled() => break,
            };

            match outcome {
                FetchOutcome::Fetched { .. } => {
                    let view = fetch.view();
                    for item in &view.items[printed..] {
                        println!("{}", item_to_json(item));
                    }
                    printed = view.items.len();
                }
                FetchOutcome::Failed(err) => return Err(err.into()),
                _ => break,
            }
        }

        let view = fetch.view();
        eprintln!(
            "{} items ({} scanned){}",
            view.count,
            view.scanned_count,
            if view.has_more {
                ", more available"
            } else {
                ""
            }
        );

        Ok(())
    }
}

/// Parses "attribute operator [value [value2]]".
fn parse_filter(text: &str) -> anyhow::Result<FilterCondition> {
    let mut parts = text.split_whitespace();
    let attribute = parts
        .next()
        .with_context(|| format!("Empty filter '{}'", text))?;
    let operator = parts
        .next()
        .with_context(|| format!("Filter '{}' lacks an operator", text))?
        .parse::<FilterOperator>()?;
    let values = parts.collect::<Vec<_>>();

    let condition = match (operator, values.as_slice()) {
        (FilterOperator::AttributeExists, []) => FilterCondition::exists(attribute),
        (FilterOperator::AttributeNotExists, []) => FilterCondition::not_exists(attribute),
        (FilterOperator::Between, [lower, upper]) => {
            FilterCondition::between(attribute, Scalar::infer(lower), Scalar::infer(upper))
        }
        (FilterOperator::Between, _) => {
            anyhow::bail!("'between' needs exactly two values, got '{}'", text)
        }
        (operator, values) if operator.takes_value() && !values.is_empty() => {
            FilterCondition::new(attribute, operator, Scalar::infer(&values.join(" ")))
        }
        _ => anyhow::bail!("Filter '{}' has the wrong number of values", text),
    };

    Ok(condition)
}

fn parse_filters(filters: &[String]) -> anyhow::Result<Vec<FilterCondition>> {
    filters.iter().map(|filter| parse_filter(filter)).collect()
}

/// Parses "operator value [value2]" into a condition on `name`.
fn parse_sort_key(name: &str, text: &str) -> anyhow::Result<SortKeyCondition> {
    let mut parts = text.split_whitespace();
    let operator = parts
        .next()
        .with_context(|| format!("Sort key condition '{}' lacks an operator", text))?
        .parse::<SortKeyOperator>()?;
    let values = parts.collect::<Vec<_>>();

    match (operator, values.as_slice()) {
        (SortKeyOperator::Between, [lower, upper]) => Ok(SortKeyCondition::between(
            name,
            Scalar::infer(lower),
            Scalar::infer(upper),
        )),
        (SortKeyOperator::Between, _) => {
            anyhow::bail!("'between' needs exactly two values, got '{}'", text)
        }
        (operator, values) if !values.is_empty() => Ok(SortKeyCondition::new(
            name,
            operator,
            Scalar::infer(&values.join(" ")),
        )),
        _ => anyhow::bail!("Sort key condition '{}' lacks a value", text),
    }
}

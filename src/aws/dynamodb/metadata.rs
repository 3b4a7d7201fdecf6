//! Memoized table descriptions.

use crate::aws::dynamodb::connection::{ConnectionCache, ConnectionConfig};
use crate::aws::dynamodb::executor::{self, ExecError};
use crate::aws::dynamodb::schema::TableInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

type CacheKey = (ConnectionConfig, String);

/// Remembers the [`TableInfo`] of every table looked at, per connection config.
///
/// Entries never expire on their own. Use [`TableMetadataCache::refetch`] once a table is
/// known to have changed.
pub struct TableMetadataCache {
    connections: Arc<ConnectionCache>,
    entries: RwLock<HashMap<CacheKey, Arc<TableInfo>>>,
}

impl TableMetadataCache {
    pub fn new(connections: Arc<ConnectionCache>) -> Self {
        Self {
            connections,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached info or describes the table once.
    ///
    /// Failures are not cached.
    pub async fn get_table_info(
        &self,
        config: &ConnectionConfig,
        table_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<TableInfo>, ExecError> {
        let key = (config.clone(), table_name.to_string());
        if let Some(info) = self.entries.read().await.get(&key) {
            return Ok(info.clone());
        }

        self.load(key, cancel).await
    }

    /// Describes the table again and replaces any cached info.
    pub async fn refetch(
        &self,
        config: &ConnectionConfig,
        table_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<TableInfo>, ExecError> {
        self.load((config.clone(), table_name.to_string()), cancel)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self, cancel), fields(table = %key.1), err(Display))]
    async fn load(
        &self,
        key: CacheKey,
        cancel: &CancellationToken,
    ) -> Result<Arc<TableInfo>, ExecError> {
        let info = Arc::new(
            executor::get_table_info(&self.connections, &key.0, &key.1, cancel).await?,
        );
        self.entries.write().await.insert(key, info.clone());

        Ok(info)
    }

    pub async fn invalidate(&self, config: &ConnectionConfig, table_name: &str) {
        let _ = self
            .entries
            .write()
            .await
            .remove(&(config.clone(), table_name.to_string()));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

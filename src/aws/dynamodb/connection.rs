//! Lazily created DynamoDB connections.
//!
//! A [`ConnectionCache`] keeps exactly one live [`ConnectionHandle`], keyed by the
//! [`ConnectionConfig`] it was built for. Asking again with the same config hands out the
//! very same handle; a different config replaces it. The cache is owned by the application
//! root and passed to whoever issues requests.

use crate::aws::dynamodb::client::{DynamoClient, StoreBackend};
use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where and as whom to connect.
///
/// Unset fields fall back to the AWS SDK's default provider chains.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Overrides the service endpoint, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
}

impl ConnectionConfig {
    pub fn new(profile: Option<String>, region: Option<String>) -> Self {
        Self {
            profile,
            region,
            endpoint_url: None,
        }
    }

    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }
}

impl Display for ConnectionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            self.profile.as_deref().unwrap_or("default"),
            self.region.as_deref().unwrap_or("default-region")
        )?;
        if let Some(endpoint) = &self.endpoint_url {
            write!(f, " ({})", endpoint)?;
        }

        Ok(())
    }
}

/// A live connection built for one [`ConnectionConfig`].
///
/// Cloning is cheap and preserves identity, see [`ConnectionHandle::same_as`].
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    config: ConnectionConfig,
    backend: Arc<dyn StoreBackend>,
}

impl ConnectionHandle {
    pub fn new(config: ConnectionConfig, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            inner: Arc::new(HandleInner { config, backend }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &dyn StoreBackend {
        self.inner.backend.as_ref()
    }

    /// Determines if both handles stem from the same connection setup.
    pub fn same_as(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for ConnectionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionHandle({})", self.inner.config)
    }
}

/// Builds the backend for a connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Arc<dyn StoreBackend>>;
}

/// Connects through the AWS SDK, resolving credentials for the configured profile.
pub struct SdkConnector;

#[async_trait]
impl Connector for SdkConnector {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Arc<dyn StoreBackend>> {
        tracing::info!("Setting up DynamoDB for {}....", config);

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        if sdk_config.region().is_none() {
            anyhow::bail!(
                "No region configured for {}. Set DYNOSCOPE_REGION or AWS_REGION.",
                config
            );
        }

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Arc::new(DynamoClient::new(Client::from_conf(
            builder.build(),
        ))))
    }
}

/// Holds the single current connection.
///
/// The check-then-set runs under an async mutex, so concurrent callers asking for a new
/// config never set up two connections.
pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    current: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
        }
    }

    /// Creates a cache which connects through the AWS SDK.
    pub fn with_sdk() -> Self {
        Self::new(Arc::new(SdkConnector))
    }

    /// Returns the cached connection for `config` or replaces it with a new one.
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn get_connection(
        &self,
        config: &ConnectionConfig,
    ) -> anyhow::Result<ConnectionHandle> {
        let mut current = self.current.lock().await;

        if let Some(handle) = current.as_ref()
            && handle.config() == config
        {
            return Ok(handle.clone());
        }

        let backend = self
            .connector
            .connect(config)
            .await
            .with_context(|| format!("Failed to connect to DynamoDB as {}", config))?;
        let handle = ConnectionHandle::new(config.clone(), backend);
        *current = Some(handle.clone());

        Ok(handle)
    }

    /// Drops the cached connection so that the next request connects again.
    pub async fn reset(&self) {
        let _ = self.current.lock().await.take();
    }
}

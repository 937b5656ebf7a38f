//! Gateway stream client.
//!
//! Opens subscriptions against the location stream gateway. Each
//! subscription owns exactly one connection at a time, driven by a
//! background task that reconnects with backoff and resumes from the last
//! confirmed event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use location_protocol::FilterSpec;
use reqwest::Url;
use tokio::sync::mpsc;

use super::config::ClientConfig;
use super::driver::Driver;
use super::error::ClientError;
use super::handler::{SubscriptionHandler, dispatch};
use super::subscription::{Shared, Subscription, SubscriptionHandle};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Client for the location stream gateway.
///
/// # Example
///
/// ```ignore
/// let client = StreamClient::new(ClientConfig::new("http://localhost:8080/api/stream"))?;
/// let mut subscription = client.open(FilterSpec::for_users(["adar"]))?;
/// while let Some(event) = subscription.next().await {
///     println!("{event:?}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    gateway_url: Url,
    config: Arc<ClientConfig>,
}

impl StreamClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let gateway_url = Url::parse(&config.gateway_url).map_err(|e| ClientError::InvalidConfig {
            message: format!("invalid gateway url: {e}"),
        })?;
        if !matches!(gateway_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig {
                message: format!("gateway url must be http or https, got {}", gateway_url.scheme()),
            });
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig {
                message: format!("http client: {e}"),
            })?;

        Ok(Self {
            http,
            gateway_url,
            config: Arc::new(config),
        })
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a subscription.
    ///
    /// The filter is validated before anything is sent. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidFilter`] for an invalid filter.
    pub fn open(&self, spec: FilterSpec) -> Result<Subscription, ClientError> {
        spec.validate()?;

        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(id, control_tx));

        tracing::info!(
            subscription = id,
            include_all = spec.include_all,
            users = spec.users.len(),
            devices = spec.devices.len(),
            heartbeat_secs = spec.heartbeat_secs,
            "Opening subscription"
        );

        let driver = Driver::new(
            self.http.clone(),
            self.gateway_url.clone(),
            Arc::clone(&self.config),
            spec,
            Arc::clone(&shared),
            event_tx,
            control_rx,
        );
        tokio::spawn(driver.run());

        Ok(Subscription::new(SubscriptionHandle::new(shared), event_rx))
    }

    /// Open a subscription whose events go to `handler`.
    ///
    /// Callbacks run one at a time, in stream order, on their own task. The
    /// subscription stays open until closed through the returned handle (or
    /// the one passed to each callback) or until it ends by itself.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidFilter`] for an invalid filter.
    pub fn open_with_handler<H>(
        &self,
        spec: FilterSpec,
        handler: H,
    ) -> Result<SubscriptionHandle, ClientError>
    where
        H: SubscriptionHandler + 'static,
    {
        let subscription = self.open(spec)?;
        let handle = subscription.handle();
        tokio::spawn(dispatch(subscription, handler));
        Ok(handle)
    }
}

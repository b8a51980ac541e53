pub mod auth;
pub mod config;
/// Puente - cluster-aware host resolution and request dispatch for a
/// document/graph database driver
///
/// Puente owns the client-side cluster concerns: which coordinator
/// serves the next request, failing over when one stops answering,
/// discovering coordinators the cluster advertises, rotating the bearer
/// credential at runtime, and sampling the server's queue-time telemetry
/// as an overload signal. The wire protocol itself is supplied by the
/// embedding driver through the `CommunicationProtocol` capability.
pub mod error;
pub mod executor;
pub mod host;
pub mod metrics;
pub mod protocol;
pub mod utils;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::JwtHolder;
use crate::executor::AsyncExecutor;
use crate::host::handler::HostHandler;
use crate::host::resolver::HostResolver;
use crate::host::{HostHandle, HostRef, HostRegistry};
use crate::metrics::QueueTimeMetrics;
use crate::protocol::{CommunicationProtocol, InternalRequest, InternalResponse};

pub use crate::config::{Config, LoadBalancingStrategy};
pub use crate::error::{PuenteError, PuenteResult};
pub use crate::host::HostDescription;

/// Cluster-aware dispatch client
///
/// Construction validates the configuration eagerly: an empty endpoint
/// list or a zero capacity/interval fails here, never on the first
/// request. When endpoint discovery is enabled, a background refresh
/// task keeps the host list current until the client is dropped.
pub struct Puente {
    config: Config,
    registry: Arc<HostRegistry>,
    handler: Arc<HostHandler>,
    resolver: Arc<HostResolver>,
    executor: AsyncExecutor,
    metrics: Arc<QueueTimeMetrics>,
    jwt: Arc<JwtHolder>,
    refresh_task: Option<JoinHandle<()>>,
}

impl Puente {
    /// Connect the dispatch core to a transport implementation
    pub async fn connect(
        config: Config,
        protocol: Arc<dyn CommunicationProtocol>,
    ) -> PuenteResult<Self> {
        config.validate()?;

        let registry = Arc::new(HostRegistry::new(config.host_descriptions()?)?);
        let handler = Arc::new(HostHandler::new(
            Arc::clone(&registry),
            config.load_balancing.strategy,
        ));
        let metrics = Arc::new(QueueTimeMetrics::new(
            config.metrics.response_queue_time_samples,
        ));

        let jwt = Arc::new(JwtHolder::new());
        if let Some(token) = &config.client.jwt {
            jwt.set_jwt(token.clone());
        }

        let resolver = Arc::new(if config.discovery.acquire_host_list {
            HostResolver::discovering(
                Arc::clone(&registry),
                Arc::clone(&protocol),
                config.discovery_interval(),
            )
        } else {
            HostResolver::fixed(Arc::clone(&registry))
        });

        // First resolve pulls the advertised coordinator list before any
        // request is dispatched; refresh errors keep the configured hosts
        resolver.resolve(true).await;
        let refresh_task = resolver.spawn_refresh();

        let executor = AsyncExecutor::new(
            protocol,
            Arc::clone(&handler),
            Arc::clone(&metrics),
            Arc::clone(&jwt),
            config.timeout(),
        );

        info!(
            "puente connected: {} host(s), strategy {:?}, discovery {}",
            registry.len(),
            config.load_balancing.strategy,
            config.discovery.acquire_host_list,
        );

        Ok(Self {
            config,
            registry,
            handler,
            resolver,
            executor,
            metrics,
            jwt,
            refresh_task,
        })
    }

    /// Run response deserialization on a dedicated runtime
    pub fn with_continuation_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.executor.set_continuation_runtime(runtime);
        self
    }

    /// Dispatch one logical call and return the raw response
    pub async fn send<B>(
        &self,
        build: B,
        handle: Option<&HostHandle>,
    ) -> PuenteResult<InternalResponse>
    where
        B: Fn() -> PuenteResult<InternalRequest> + Send + Sync,
    {
        self.executor.send(build, handle).await
    }

    /// Dispatch and hand the response to a caller-supplied deserializer
    pub async fn execute_with<T, B, D>(
        &self,
        build: B,
        deserialize: D,
        handle: Option<&HostHandle>,
    ) -> PuenteResult<T>
    where
        B: Fn() -> PuenteResult<InternalRequest> + Send + Sync,
        D: FnOnce(InternalResponse) -> PuenteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.executor.execute_with(build, deserialize, handle).await
    }

    /// Dispatch and decode the response body as JSON
    pub async fn execute_json<T, B>(&self, build: B, handle: Option<&HostHandle>) -> PuenteResult<T>
    where
        B: Fn() -> PuenteResult<InternalRequest> + Send + Sync,
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.executor.execute_json(build, handle).await
    }

    /// Handle for a multi-step operation that must stay on one coordinator
    pub fn host_handle(&self) -> HostHandle {
        HostHandle::new()
    }

    /// Handle for reads allowed to be served by followers/replicas
    pub fn dirty_read_handle(&self) -> HostHandle {
        HostHandle::dirty_read()
    }

    /// Replace the bearer credential for all subsequent requests
    pub fn set_jwt(&self, token: impl Into<String>) {
        self.jwt.set_jwt(token);
    }

    /// Drop the bearer credential
    pub fn clear_jwt(&self) {
        self.jwt.clear_jwt();
    }

    /// Average server-reported queue time over the sample window, seconds
    pub fn queue_time_avg(&self) -> f64 {
        self.metrics.avg()
    }

    pub fn queue_time_metrics(&self) -> &Arc<QueueTimeMetrics> {
        &self.metrics
    }

    /// Snapshot of the currently known hosts
    pub fn hosts(&self) -> Arc<Vec<HostRef>> {
        self.registry.snapshot()
    }

    pub fn handler(&self) -> &Arc<HostHandler> {
        &self.handler
    }

    pub fn resolver(&self) -> &Arc<HostResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Puente {
    fn drop(&mut self) {
        if let Some(task) = &self.refresh_task {
            task.abort();
        }
    }
}

/// Request orchestration: build, dispatch, fail over, interpret
///
/// One logical call runs the same state machine in both variants: the
/// caller's builder produces a fresh request immediately before every
/// physical attempt, the host handler picks the target, and transport
/// failures rotate to the next candidate until every known host was
/// tried once. Any well-formed response ends the loop; interpreting its
/// status is the caller's business.
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::auth::JwtHolder;
use crate::error::{PuenteError, PuenteResult};
use crate::host::handler::HostHandler;
use crate::host::HostHandle;
use crate::metrics::QueueTimeMetrics;
use crate::protocol::{
    BlockingProtocol, CommunicationProtocol, InternalRequest, InternalResponse,
    AUTHORIZATION_HEADER, DIRTY_READ_HEADER, QUEUE_TIME_HEADER,
};

/// Attach the per-attempt headers: bearer token, queue-time budget, and
/// the dirty-read marker when the operation allows stale reads. Reading
/// the credential here, per attempt, is what makes a runtime swap
/// visible mid-retry-loop.
fn decorate(request: &mut InternalRequest, jwt: &JwtHolder, timeout: Duration, dirty: bool) {
    if let Some(token) = jwt.jwt() {
        request.set_header(AUTHORIZATION_HEADER, format!("bearer {}", token));
    }
    request.set_header(QUEUE_TIME_HEADER, format!("{:.3}", timeout.as_secs_f64()));
    if dirty {
        request.set_header(DIRTY_READ_HEADER, "true");
    }
}

/// Pull the server-reported queueing delay into the sample ring
fn harvest_queue_time(metrics: &QueueTimeMetrics, response: &InternalResponse) {
    if let Some(value) = response.meta(QUEUE_TIME_HEADER) {
        match value.parse::<f64>() {
            Ok(seconds) => metrics.add(seconds),
            Err(_) => warn!("unparsable queue time header value {:?}", value),
        }
    }
}

fn exhausted(attempts: usize, last_error: Option<crate::protocol::TransportError>) -> PuenteError {
    match last_error {
        Some(source) => PuenteError::NoHostAvailable { attempts, source },
        None => PuenteError::internal("dispatch loop ended without an attempt"),
    }
}

/// Async request executor
pub struct AsyncExecutor {
    protocol: Arc<dyn CommunicationProtocol>,
    handler: Arc<HostHandler>,
    metrics: Arc<QueueTimeMetrics>,
    jwt: Arc<JwtHolder>,
    timeout: Duration,
    continuation: Option<tokio::runtime::Handle>,
}

impl AsyncExecutor {
    pub fn new(
        protocol: Arc<dyn CommunicationProtocol>,
        handler: Arc<HostHandler>,
        metrics: Arc<QueueTimeMetrics>,
        jwt: Arc<JwtHolder>,
        timeout: Duration,
    ) -> Self {
        Self {
            protocol,
            handler,
            metrics,
            jwt,
            timeout,
            continuation: None,
        }
    }

    /// Run deserialization on the given runtime instead of the caller's
    /// task, keeping transport threads free of user-side decoding
    pub fn with_continuation_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.continuation = Some(runtime);
        self
    }

    pub fn set_continuation_runtime(&mut self, runtime: tokio::runtime::Handle) {
        self.continuation = Some(runtime);
    }

    pub fn handler(&self) -> &Arc<HostHandler> {
        &self.handler
    }

    pub fn metrics(&self) -> &Arc<QueueTimeMetrics> {
        &self.metrics
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
        let attempts = self.handler.registry().len().max(1);
        let dirty = handle.map(HostHandle::allows_dirty_read).unwrap_or(false);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let host = self.handler.select(handle)?;
            let mut request = build()?;
            decorate(&mut request, &self.jwt, self.timeout, dirty);

            match self.protocol.execute(request, &host).await {
                Ok(response) => {
                    self.handler.success(&host, dirty);
                    if let Some(handle) = handle {
                        handle.set_host(Arc::clone(&host));
                    }
                    harvest_queue_time(&self.metrics, &response);
                    return Ok(response);
                }
                Err(err) => {
                    warn!("attempt {}/{} against {} failed: {}", attempt, attempts, host, err);
                    self.handler.fail(&host, dirty);
                    if let Some(handle) = handle {
                        handle.clear_host();
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(exhausted(attempts, last_error))
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
        let response = self.send(build, handle).await?;

        match &self.continuation {
            Some(runtime) => runtime
                .spawn(async move { deserialize(response) })
                .await
                .map_err(|e| PuenteError::internal(format!("continuation task failed: {e}")))?,
            None => deserialize(response),
        }
    }

    /// Dispatch and decode the response body as JSON
    pub async fn execute_json<T, B>(&self, build: B, handle: Option<&HostHandle>) -> PuenteResult<T>
    where
        B: Fn() -> PuenteResult<InternalRequest> + Send + Sync,
        T: DeserializeOwned + Send + 'static,
    {
        self.execute_with(
            build,
            |response| Ok(serde_json::from_slice(&response.body)?),
            handle,
        )
        .await
    }
}

/// Blocking request executor for embedders without an async runtime
///
/// Same state machine as the async variant; the calling thread blocks
/// only inside the transport's `execute`.
pub struct Executor {
    protocol: Arc<dyn BlockingProtocol>,
    handler: Arc<HostHandler>,
    metrics: Arc<QueueTimeMetrics>,
    jwt: Arc<JwtHolder>,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        protocol: Arc<dyn BlockingProtocol>,
        handler: Arc<HostHandler>,
        metrics: Arc<QueueTimeMetrics>,
        jwt: Arc<JwtHolder>,
        timeout: Duration,
    ) -> Self {
        Self {
            protocol,
            handler,
            metrics,
            jwt,
            timeout,
        }
    }

    pub fn handler(&self) -> &Arc<HostHandler> {
        &self.handler
    }

    pub fn metrics(&self) -> &Arc<QueueTimeMetrics> {
        &self.metrics
    }

    /// Dispatch one logical call and return the raw response
    pub fn send<B>(&self, build: B, handle: Option<&HostHandle>) -> PuenteResult<InternalResponse>
    where
        B: Fn() -> PuenteResult<InternalRequest>,
    {
        let attempts = self.handler.registry().len().max(1);
        let dirty = handle.map(HostHandle::allows_dirty_read).unwrap_or(false);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let host = self.handler.select(handle)?;
            let mut request = build()?;
            decorate(&mut request, &self.jwt, self.timeout, dirty);

            match self.protocol.execute(request, &host) {
                Ok(response) => {
                    self.handler.success(&host, dirty);
                    if let Some(handle) = handle {
                        handle.set_host(Arc::clone(&host));
                    }
                    harvest_queue_time(&self.metrics, &response);
                    return Ok(response);
                }
                Err(err) => {
                    warn!("attempt {}/{} against {} failed: {}", attempt, attempts, host, err);
                    self.handler.fail(&host, dirty);
                    if let Some(handle) = handle {
                        handle.clear_host();
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(exhausted(attempts, last_error))
    }

    /// Dispatch and hand the response to a caller-supplied deserializer
    pub fn execute_with<T, B, D>(
        &self,
        build: B,
        deserialize: D,
        handle: Option<&HostHandle>,
    ) -> PuenteResult<T>
    where
        B: Fn() -> PuenteResult<InternalRequest>,
        D: FnOnce(InternalResponse) -> PuenteResult<T>,
    {
        let response = self.send(build, handle)?;
        deserialize(response)
    }

    /// Dispatch and decode the response body as JSON
    pub fn execute_json<T, B>(&self, build: B, handle: Option<&HostHandle>) -> PuenteResult<T>
    where
        B: Fn() -> PuenteResult<InternalRequest>,
        T: DeserializeOwned,
    {
        self.execute_with(
            build,
            |response| Ok(serde_json::from_slice(&response.body)?),
            handle,
        )
    }
}

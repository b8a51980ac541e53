/// Transport boundary between the dispatch core and the wire protocol
///
/// The core never opens sockets itself. It builds `InternalRequest`
/// values, picks a host, and hands both to a `CommunicationProtocol`
/// implementation supplied by the embedding driver. Failures come back
/// as explicit `TransportError` variants so the executor can drive
/// failover by matching on the result.
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::host::Host;

/// Response header carrying the server-side queueing delay in seconds.
/// Requests reuse the same header to advertise the client timeout budget.
pub const QUEUE_TIME_HEADER: &str = "x-queue-time-seconds";

/// Request header marking a read as allowed on a follower/replica.
pub const DIRTY_READ_HEADER: &str = "x-allow-dirty-read";

/// Request header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// HTTP-style request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
            Method::Head => write!(f, "HEAD"),
        }
    }
}

/// One outgoing request, immutable once handed to the transport
#[derive(Debug, Clone)]
pub struct InternalRequest {
    pub method: Method,
    pub path: String,
    pub queries: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl InternalRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            queries: HashMap::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.queries.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header in place; used by the executor to decorate each attempt
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }
}

/// One incoming response as delivered by the transport
#[derive(Debug, Clone)]
pub struct InternalResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl InternalResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Header/metadata accessor
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// True for well-formed error responses (4xx/5xx). These are still
    /// dispatch successes: the host answered.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Transport-level failures. Every variant triggers failover to the next
/// host; application errors never surface through this type.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused by {host}")]
    ConnectionRefused { host: String },

    #[error("request to {host} timed out")]
    Timeout { host: String },

    #[error("connection to {host} closed: {reason}")]
    ConnectionClosed { host: String, reason: String },

    #[error("protocol handshake with {host} failed: {reason}")]
    Handshake { host: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Async transport capability supplied by the wire-protocol layer
#[async_trait]
pub trait CommunicationProtocol: Send + Sync {
    /// Execute one request against an already-selected host. Any
    /// well-formed response, regardless of status, is `Ok`.
    async fn execute(
        &self,
        request: InternalRequest,
        host: &Host,
    ) -> Result<InternalResponse, TransportError>;
}

/// Blocking transport capability for embedders without an async runtime
pub trait BlockingProtocol: Send + Sync {
    fn execute(
        &self,
        request: InternalRequest,
        host: &Host,
    ) -> Result<InternalResponse, TransportError>;
}

/// Shared per-endpoint connection-pool handle
///
/// The core creates one pool per host and shares it for the lifetime of
/// the client; the transport layer checks connections in and out through
/// leases. Pool identity is what the registry preserves across topology
/// refreshes.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    active: AtomicUsize,
    total_leases: AtomicUsize,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                active: AtomicUsize::new(0),
                total_leases: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out one connection slot; returned to the pool on drop
    pub fn lease(&self) -> PoolLease {
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        self.inner.total_leases.fetch_add(1, Ordering::Relaxed);
        PoolLease {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of leases currently outstanding
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Number of leases handed out over the pool's lifetime
    pub fn total_leases(&self) -> usize {
        self.inner.total_leases.load(Ordering::Relaxed)
    }

    /// Whether two handles refer to the same underlying pool
    pub fn same_pool(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII lease on one pool slot
#[derive(Debug)]
pub struct PoolLease {
    inner: Arc<PoolInner>,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::Relaxed);
    }
}

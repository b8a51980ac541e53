/// Host topology model shared by the dispatch and discovery paths
pub mod handler;
pub mod resolver;

use arc_swap::{ArcSwap, ArcSwapOption};
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::error::PuenteResult;
use crate::protocol::ConnectionPool;

/// Immutable (address, port) pair identifying one server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostDescription {
    pub address: String,
    pub port: u16,
}

impl HostDescription {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for HostDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One reachable endpoint plus its pooled-connection handle
///
/// Hosts are created once (at construction or when discovery finds a new
/// coordinator) and shared behind an `Arc` for the lifetime of the
/// client. The pool handle is the part whose identity must survive
/// topology refreshes.
#[derive(Debug)]
pub struct Host {
    description: HostDescription,
    pool: ConnectionPool,
}

/// Shared reference to a registered host
pub type HostRef = Arc<Host>;

impl Host {
    pub fn new(description: HostDescription) -> Self {
        Self {
            description,
            pool: ConnectionPool::new(),
        }
    }

    pub fn description(&self) -> &HostDescription {
        &self.description
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.description.fmt(f)
    }
}

/// Ordered, copy-on-write list of known hosts
///
/// List order is fallback priority. Readers take lock-free snapshots on
/// every request; writes happen only on topology change and swap in a
/// fresh list, so in-flight readers keep the snapshot they started with.
#[derive(Debug)]
pub struct HostRegistry {
    hosts: ArcSwap<Vec<HostRef>>,
}

impl HostRegistry {
    /// Build the initial registry; at least one endpoint is required
    pub fn new(descriptions: Vec<HostDescription>) -> PuenteResult<Self> {
        if descriptions.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one endpoint is required".to_string(),
            )
            .into());
        }

        let hosts: Vec<HostRef> = descriptions
            .into_iter()
            .map(|description| Arc::new(Host::new(description)))
            .collect();

        Ok(Self {
            hosts: ArcSwap::from_pointee(hosts),
        })
    }

    /// Current host list; cheap, lock-free
    pub fn snapshot(&self) -> Arc<Vec<HostRef>> {
        self.hosts.load_full()
    }

    pub fn len(&self) -> usize {
        self.hosts.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.load().is_empty()
    }

    /// Look up a host by its description
    pub fn find(&self, description: &HostDescription) -> Option<HostRef> {
        self.hosts
            .load()
            .iter()
            .find(|host| host.description() == description)
            .cloned()
    }

    /// Whether this exact host instance is currently registered
    pub fn contains(&self, host: &HostRef) -> bool {
        self.hosts
            .load()
            .iter()
            .any(|registered| Arc::ptr_eq(registered, host))
    }

    /// Merge newly advertised endpoints into the list
    ///
    /// Existing hosts keep their identity and pools; only unseen
    /// descriptions are appended. Endpoints missing from `descriptions`
    /// are NOT evicted, so operations pinned to a retiring coordinator
    /// keep a usable host. Returns the number of hosts added.
    pub fn merge(&self, descriptions: &[HostDescription]) -> usize {
        let candidates: Vec<HostRef> = descriptions
            .iter()
            .map(|description| Arc::new(Host::new(description.clone())))
            .collect();

        let mut added = 0;
        self.hosts.rcu(|current| {
            let mut next = Vec::clone(current);
            added = 0;
            for candidate in &candidates {
                let seen = next
                    .iter()
                    .any(|host| host.description() == candidate.description());
                if !seen {
                    next.push(Arc::clone(candidate));
                    added += 1;
                }
            }
            next
        });
        added
    }
}

/// Per-operation dispatch hint owned by the caller
///
/// Pins multi-step operations (cursor pagination) to the coordinator
/// that started them and marks requests that tolerate stale reads from
/// a follower. The executor updates the pin after each selection and
/// clears it when the pinned host fails at the transport level.
#[derive(Debug, Default)]
pub struct HostHandle {
    pinned: ArcSwapOption<Host>,
    dirty_read: bool,
}

impl HostHandle {
    pub fn new() -> Self {
        Self {
            pinned: ArcSwapOption::empty(),
            dirty_read: false,
        }
    }

    /// Handle for requests allowed to read from followers/replicas
    pub fn dirty_read() -> Self {
        Self {
            pinned: ArcSwapOption::empty(),
            dirty_read: true,
        }
    }

    pub fn allows_dirty_read(&self) -> bool {
        self.dirty_read
    }

    pub fn host(&self) -> Option<HostRef> {
        self.pinned.load_full()
    }

    pub fn set_host(&self, host: HostRef) {
        self.pinned.store(Some(host));
    }

    pub fn clear_host(&self) {
        self.pinned.store(None);
    }
}

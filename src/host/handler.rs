/// Host selection policy and failure feedback
///
/// One handler serves all concurrent request paths. Strategy state is a
/// single atomic cursor (or a swappable sticky origin), so selection
/// never takes a lock and concurrent callers cannot observe a torn
/// index. Failure feedback only reorders future selections; it never
/// removes a host from the registry.
use arc_swap::ArcSwapOption;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::LoadBalancingStrategy;
use crate::error::{PuenteError, PuenteResult};
use crate::host::{Host, HostHandle, HostRef, HostRegistry};

/// Stateful dispatch policy over the shared host registry
pub struct HostHandler {
    registry: Arc<HostRegistry>,
    primary: Strategy,
    /// Independent cursor spreading dirty-read-tolerant requests across
    /// all hosts, whatever the primary strategy prefers
    dirty: RoundRobinCursor,
}

/// Closed set of selection strategies, picked from configuration
enum Strategy {
    Fallback(FallbackCursor),
    RoundRobin(RoundRobinCursor),
    Random(StickyRandom),
}

/// Advancing cursor: every selection moves to the next host in order
struct RoundRobinCursor {
    cursor: AtomicUsize,
}

impl RoundRobinCursor {
    fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    fn select(&self, hosts: &[HostRef]) -> HostRef {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        Arc::clone(&hosts[index])
    }
}

/// Fixed preferred host, advanced only when it fails
struct FallbackCursor {
    current: AtomicUsize,
}

impl FallbackCursor {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
        }
    }

    fn select(&self, hosts: &[HostRef]) -> HostRef {
        let index = self.current.load(Ordering::Acquire) % hosts.len();
        Arc::clone(&hosts[index])
    }

    fn fail(&self, failed: &HostRef, hosts: &[HostRef]) {
        let current = self.current.load(Ordering::Acquire);
        // Advance only if the cursor still points at the failed host, so
        // concurrent reports of the same failure move it a single step
        if Arc::ptr_eq(&hosts[current % hosts.len()], failed) {
            let _ = self.current.compare_exchange(
                current,
                current.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }
}

/// One random host kept until it fails, then rotated via round-robin
struct StickyRandom {
    origin: ArcSwapOption<Host>,
    fallback: RoundRobinCursor,
}

impl StickyRandom {
    fn new() -> Self {
        Self {
            origin: ArcSwapOption::empty(),
            fallback: RoundRobinCursor::new(),
        }
    }

    fn select(&self, hosts: &[HostRef], registry: &HostRegistry) -> HostRef {
        if let Some(origin) = self.origin.load_full() {
            if registry.contains(&origin) {
                return origin;
            }
        }
        let index = rand::thread_rng().gen_range(0..hosts.len());
        let chosen = Arc::clone(&hosts[index]);
        self.origin.store(Some(Arc::clone(&chosen)));
        chosen
    }

    fn fail(&self, failed: &HostRef, hosts: &[HostRef]) {
        let origin = self.origin.load_full();
        let origin_failed = origin
            .as_ref()
            .map(|host| Arc::ptr_eq(host, failed))
            .unwrap_or(false);
        if !origin_failed {
            return;
        }

        let mut next = self.fallback.select(hosts);
        if Arc::ptr_eq(&next, failed) && hosts.len() > 1 {
            next = self.fallback.select(hosts);
        }
        log::debug!("random origin {} failed, moving to {}", failed, next);
        self.origin.store(Some(next));
    }
}

impl HostHandler {
    pub fn new(registry: Arc<HostRegistry>, strategy: LoadBalancingStrategy) -> Self {
        let primary = match strategy {
            LoadBalancingStrategy::None => Strategy::Fallback(FallbackCursor::new()),
            LoadBalancingStrategy::RoundRobin => Strategy::RoundRobin(RoundRobinCursor::new()),
            LoadBalancingStrategy::OneRandom => Strategy::Random(StickyRandom::new()),
        };
        Self {
            registry,
            primary,
            dirty: RoundRobinCursor::new(),
        }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Choose the host for the next attempt
    ///
    /// A handle pinned to a still-registered host bypasses policy.
    /// Otherwise the dirty-read cursor or the primary strategy decides,
    /// and the choice is recorded back into the handle so continuations
    /// of the same operation land on the same coordinator.
    pub fn select(&self, handle: Option<&HostHandle>) -> PuenteResult<HostRef> {
        if let Some(handle) = handle {
            if let Some(pinned) = handle.host() {
                if self.registry.contains(&pinned) {
                    return Ok(pinned);
                }
                handle.clear_host();
            }
        }

        let hosts = self.registry.snapshot();
        if hosts.is_empty() {
            return Err(PuenteError::internal("host registry is empty"));
        }

        let dirty = handle.map(HostHandle::allows_dirty_read).unwrap_or(false);
        let chosen = if dirty {
            self.dirty.select(&hosts)
        } else {
            match &self.primary {
                Strategy::Fallback(cursor) => cursor.select(&hosts),
                Strategy::RoundRobin(cursor) => cursor.select(&hosts),
                Strategy::Random(sticky) => sticky.select(&hosts, &self.registry),
            }
        };

        if let Some(handle) = handle {
            handle.set_host(Arc::clone(&chosen));
        }
        Ok(chosen)
    }

    /// A well-formed response arrived from `host`
    pub fn success(&self, host: &HostRef, dirty: bool) {
        log::trace!("dispatch to {} succeeded (dirty read: {})", host, dirty);
    }

    /// Transport-level failure talking to `host`
    pub fn fail(&self, host: &HostRef, dirty: bool) {
        log::debug!("dispatch to {} failed (dirty read: {})", host, dirty);
        if dirty {
            // The dirty cursor advances on every selection anyway; the
            // next dirty read already lands elsewhere
            return;
        }
        let hosts = self.registry.snapshot();
        if hosts.is_empty() {
            return;
        }
        match &self.primary {
            Strategy::Fallback(cursor) => cursor.fail(host, &hosts),
            Strategy::RoundRobin(_) => {}
            Strategy::Random(sticky) => sticky.fail(host, &hosts),
        }
    }
}

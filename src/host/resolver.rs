/// Cluster endpoint discovery
///
/// The static variant only ever reports the configured hosts. The
/// discovering variant additionally asks the cluster for its current
/// coordinator list, on first use and on a background interval, and
/// merges new endpoints into the registry. Refresh is best-effort: a
/// failed refresh is logged and the previous host list stays valid.
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{PuenteError, PuenteResult};
use crate::host::{HostDescription, HostRef, HostRegistry};
use crate::protocol::{CommunicationProtocol, InternalRequest, Method};
use crate::utils;

/// Administrative path returning the coordinator endpoint list
pub const CLUSTER_ENDPOINTS_PATH: &str = "/_api/cluster/endpoints";

#[derive(Debug, Deserialize)]
struct EndpointsDocument {
    endpoints: Vec<EndpointEntry>,
}

#[derive(Debug, Deserialize)]
struct EndpointEntry {
    endpoint: String,
}

/// Read access to the host list, with optional refresh-on-demand
pub struct HostResolver {
    registry: Arc<HostRegistry>,
    discovery: Option<Arc<EndpointDiscovery>>,
}

impl HostResolver {
    /// Resolver over a fixed, configuration-supplied host list
    pub fn fixed(registry: Arc<HostRegistry>) -> Self {
        Self {
            registry,
            discovery: None,
        }
    }

    /// Resolver that also discovers coordinators through the cluster
    pub fn discovering(
        registry: Arc<HostRegistry>,
        protocol: Arc<dyn CommunicationProtocol>,
        interval: Duration,
    ) -> Self {
        let discovery = EndpointDiscovery {
            registry: Arc::clone(&registry),
            protocol,
            interval,
        };
        Self {
            registry,
            discovery: Some(Arc::new(discovery)),
        }
    }

    /// Current host list. With `initial` set, a discovering resolver
    /// refreshes from the cluster first; refresh errors are swallowed
    /// and the known list is returned unchanged.
    pub async fn resolve(&self, initial: bool) -> Arc<Vec<HostRef>> {
        if initial {
            if let Some(discovery) = &self.discovery {
                if let Err(err) = discovery.refresh().await {
                    warn!("initial endpoint discovery failed: {}", err);
                }
            }
        }
        self.registry.snapshot()
    }

    /// Spawn the periodic refresh loop; `None` for the fixed variant
    pub fn spawn_refresh(&self) -> Option<JoinHandle<()>> {
        self.discovery
            .as_ref()
            .map(|discovery| tokio::spawn(Arc::clone(discovery).run()))
    }
}

/// Periodic cluster-endpoint fetch and merge
pub struct EndpointDiscovery {
    registry: Arc<HostRegistry>,
    protocol: Arc<dyn CommunicationProtocol>,
    interval: Duration,
}

impl EndpointDiscovery {
    /// Fetch the advertised endpoint list through any answering host
    /// and merge it into the registry. Returns the number of hosts
    /// added. Transport failures fall through to the next known host.
    pub async fn refresh(&self) -> PuenteResult<usize> {
        let hosts = self.registry.snapshot();
        let mut last_error = None;

        for host in hosts.iter() {
            let request = InternalRequest::new(Method::Get, CLUSTER_ENDPOINTS_PATH);
            match self.protocol.execute(request, host).await {
                Ok(response) if !response.is_error() => {
                    let document: EndpointsDocument = serde_json::from_slice(&response.body)?;
                    return Ok(self.merge_document(document));
                }
                Ok(response) => {
                    return Err(PuenteError::resolve(format!(
                        "endpoint listing on {} answered with status {}",
                        host, response.status
                    )));
                }
                Err(err) => {
                    debug!("endpoint listing on {} failed: {}", host, err);
                    last_error = Some(err);
                }
            }
        }

        Err(PuenteError::resolve(format!(
            "no host answered the endpoint listing ({} tried): {}",
            hosts.len(),
            last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no hosts known".to_string()),
        )))
    }

    fn merge_document(&self, document: EndpointsDocument) -> usize {
        let mut descriptions = Vec::with_capacity(document.endpoints.len());
        for entry in document.endpoints {
            match utils::parse_endpoint(&entry.endpoint) {
                Ok(description) => descriptions.push(description),
                Err(err) => warn!("skipping advertised endpoint {:?}: {}", entry.endpoint, err),
            }
        }

        let added = self.registry.merge(&descriptions);
        if added > 0 {
            info!(
                "discovered {} new coordinator(s), {} known",
                added,
                self.registry.len()
            );
        }
        added
    }

    /// Interval loop driving `refresh`; never exits, never propagates
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.refresh().await {
                Ok(added) if added > 0 => {
                    debug!("endpoint refresh added {} host(s)", added);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("endpoint refresh failed, keeping known hosts: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::protocol::{InternalResponse, TransportError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Outcome {
        Refuse,
        Status(u16),
        Endpoints(Vec<&'static str>),
    }

    /// Transport stub answering per-port scripted outcomes
    struct ScriptedProtocol {
        outcomes: HashMap<u16, Outcome>,
        calls: Mutex<Vec<u16>>,
    }

    impl ScriptedProtocol {
        fn new(outcomes: HashMap<u16, Outcome>) -> Self {
            Self {
                outcomes,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u16> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommunicationProtocol for ScriptedProtocol {
        async fn execute(
            &self,
            request: InternalRequest,
            host: &Host,
        ) -> Result<InternalResponse, TransportError> {
            assert_eq!(request.path, CLUSTER_ENDPOINTS_PATH);
            let port = host.description().port;
            self.calls.lock().unwrap().push(port);

            match self.outcomes.get(&port) {
                Some(Outcome::Refuse) | None => Err(TransportError::ConnectionRefused {
                    host: host.to_string(),
                }),
                Some(Outcome::Status(status)) => Ok(InternalResponse::new(*status)),
                Some(Outcome::Endpoints(endpoints)) => {
                    let entries: Vec<String> = endpoints
                        .iter()
                        .map(|endpoint| format!("{{\"endpoint\":\"{}\"}}", endpoint))
                        .collect();
                    let body = format!("{{\"endpoints\":[{}]}}", entries.join(","));
                    Ok(InternalResponse::new(200).with_body(Bytes::from(body)))
                }
            }
        }
    }

    fn registry(ports: &[u16]) -> Arc<HostRegistry> {
        let descriptions = ports
            .iter()
            .map(|&port| HostDescription::new("127.0.0.1", port))
            .collect();
        Arc::new(HostRegistry::new(descriptions).unwrap())
    }

    #[test]
    fn test_fixed_resolver_is_a_pure_accessor() {
        let registry = registry(&[8500, 8501]);
        let resolver = HostResolver::fixed(Arc::clone(&registry));

        let hosts = tokio_test::block_on(resolver.resolve(true));
        assert_eq!(hosts.len(), 2);
        // No discovery configured: nothing to spawn
        assert!(resolver.spawn_refresh().is_none());
    }

    #[tokio::test]
    async fn test_refresh_merges_new_endpoints() {
        let registry = registry(&[8500]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([(
            8500,
            Outcome::Endpoints(vec![
                "tcp://127.0.0.1:8500",
                "tcp://127.0.0.1:8501",
                "tcp://127.0.0.1:8502",
            ]),
        )])));

        let resolver =
            HostResolver::discovering(Arc::clone(&registry), protocol, Duration::from_secs(60));
        let hosts = resolver.resolve(true).await;

        assert_eq!(hosts.len(), 3);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_across_hosts() {
        let registry = registry(&[8500, 8501]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([
            (8500, Outcome::Refuse),
            (8501, Outcome::Endpoints(vec!["tcp://127.0.0.1:8501"])),
        ])));

        let discovery = EndpointDiscovery {
            registry: Arc::clone(&registry),
            protocol: Arc::clone(&protocol) as Arc<dyn CommunicationProtocol>,
            interval: Duration::from_secs(60),
        };

        assert_eq!(discovery.refresh().await.unwrap(), 0);
        assert_eq!(protocol.calls(), vec![8500, 8501]);
    }

    #[tokio::test]
    async fn test_refresh_twice_preserves_host_identity() {
        let registry = registry(&[8500]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([(
            8500,
            Outcome::Endpoints(vec!["tcp://127.0.0.1:8500", "tcp://127.0.0.1:8501"]),
        )])));

        let discovery = EndpointDiscovery {
            registry: Arc::clone(&registry),
            protocol,
            interval: Duration::from_secs(60),
        };

        assert_eq!(discovery.refresh().await.unwrap(), 1);
        let before = registry.snapshot();

        assert_eq!(discovery.refresh().await.unwrap(), 0);
        let after = registry.snapshot();

        assert_eq!(before.len(), after.len());
        for (old, new) in before.iter().zip(after.iter()) {
            assert!(Arc::ptr_eq(old, new));
            assert!(old.pool().same_pool(new.pool()));
        }
    }

    #[tokio::test]
    async fn test_refresh_error_keeps_known_hosts() {
        let registry = registry(&[8500, 8501]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([
            (8500, Outcome::Refuse),
            (8501, Outcome::Refuse),
        ])));

        let resolver =
            HostResolver::discovering(Arc::clone(&registry), protocol, Duration::from_secs(60));

        // Swallowed failure: the configured hosts remain usable
        let hosts = resolver.resolve(true).await;
        assert_eq!(hosts.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_rejects_error_status() {
        let registry = registry(&[8500]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([(
            8500,
            Outcome::Status(403),
        )])));

        let discovery = EndpointDiscovery {
            registry,
            protocol,
            interval: Duration::from_secs(60),
        };

        let err = discovery.refresh().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_refresh_skips_unparsable_endpoints() {
        let registry = registry(&[8500]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([(
            8500,
            Outcome::Endpoints(vec!["tcp://127.0.0.1:8501", "not-an-endpoint"]),
        )])));

        let discovery = EndpointDiscovery {
            registry: Arc::clone(&registry),
            protocol,
            interval: Duration::from_secs(60),
        };

        assert_eq!(discovery.refresh().await.unwrap(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_background_refresh_loop() {
        let registry = registry(&[8500]);
        let protocol = Arc::new(ScriptedProtocol::new(HashMap::from([(
            8500,
            Outcome::Endpoints(vec!["tcp://127.0.0.1:8500", "tcp://127.0.0.1:8501"]),
        )])));

        let resolver = HostResolver::discovering(
            Arc::clone(&registry),
            protocol,
            Duration::from_millis(10),
        );

        let task = resolver.spawn_refresh().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(registry.len(), 2);
    }
}

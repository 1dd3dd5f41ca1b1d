//! Accept loop and per-connection request handling.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use simplemx_core::{Dispatcher, MetadataRecord, PublishError, Publisher, StructuredName};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::protocol::{json_to_value, Request, Response};
use crate::stats::ListenerStats;

/// What the endpoint currently publishes: one metadata record per name.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: RwLock<BTreeMap<StructuredName, MetadataRecord>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<StructuredName> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &StructuredName) -> Option<MetadataRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Publisher for Catalog {
    fn publish(
        &self,
        name: &StructuredName,
        metadata: &MetadataRecord,
    ) -> Result<(), PublishError> {
        debug!(name = %name, "publishing");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), metadata.clone());
        Ok(())
    }

    fn retract(&self, name: &StructuredName) -> Result<(), PublishError> {
        debug!(name = %name, "retracting");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

/// Shared state of one running endpoint.
pub(crate) struct Endpoint {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) stats: Arc<ListenerStats>,
    pub(crate) max_message_size: usize,
    pub(crate) connections: Arc<Semaphore>,
}

impl Endpoint {
    /// Answer one request. Runs member code, so call it off the async
    /// workers.
    pub(crate) fn respond(&self, request: Request) -> Response {
        let outcome = match request {
            Request::List => {
                self.dispatcher.registry().prune();
                Ok(Response::Names {
                    names: self.catalog.names(),
                })
            }
            Request::Describe { name } => {
                self.dispatcher.registry().prune();
                match self.catalog.get(&name) {
                    Some(metadata) => Ok(Response::Metadata { metadata }),
                    None => Err(simplemx_core::Error::NotFound(name)),
                }
            }
            Request::Get { name, attribute } => self
                .dispatcher
                .get_attribute(&name, &attribute)
                .map(Response::value),
            Request::Set {
                name,
                attribute,
                value,
            } => self
                .dispatcher
                .set_attribute(&name, &attribute, json_to_value(value))
                .map(|()| Response::Ok),
            Request::Invoke {
                name,
                operation,
                args,
                signature,
            } => {
                let args = args.into_iter().map(json_to_value).collect();
                let result = match signature {
                    Some(signature) => {
                        self.dispatcher
                            .invoke_signature(&name, &operation, &signature, args)
                    }
                    None => self.dispatcher.invoke(&name, &operation, args),
                };
                result.map(Response::value)
            }
        };

        outcome.unwrap_or_else(|err| {
            debug!(error = %err, kind = err.kind(), "request failed");
            Response::from(&err)
        })
    }
}

/// Accept clients until `shutdown` flips, then close every open connection.
pub(crate) async fn serve(
    listener: TcpListener,
    endpoint: Arc<Endpoint>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let permit = match endpoint.connections.clone().try_acquire_owned() {
                            Ok(permit) => permit,
                            Err(_) => {
                                warn!(%peer_addr, "connection limit reached, refusing client");
                                continue;
                            }
                        };
                        debug!(%peer_addr, "new connection");
                        endpoint.stats.record_connection();

                        let endpoint = endpoint.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            let result =
                                handle_connection(stream, peer_addr, endpoint, shutdown).await;
                            if let Err(e) = result {
                                warn!(%peer_addr, "connection error: {}", e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => {
                info!("management listener shutting down");
                break;
            }
        }
    }

    connections.shutdown().await;
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    endpoint: Arc<Endpoint>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let mut conn = Connection::new(stream, endpoint.max_message_size);

    loop {
        let request = tokio::select! {
            result = conn.read_message::<Request>() => result,
            _ = shutdown.changed() => {
                debug!(%peer_addr, "closing connection for shutdown");
                return Ok(());
            }
        };

        let response = match request {
            Ok(Some(request)) => {
                debug!(%peer_addr, ?request, "request");
                let endpoint = endpoint.clone();
                match tokio::task::spawn_blocking(move || endpoint.respond(request)).await {
                    Ok(response) => response,
                    Err(e) => Response::error("internal", e.to_string()),
                }
            }
            Ok(None) => {
                debug!(%peer_addr, "connection closed");
                return Ok(());
            }
            Err(e) if e.is_recoverable() => Response::error("bad_request", e.to_string()),
            Err(e) => return Err(e),
        };

        endpoint.stats.record_request();
        conn.send_message(&response).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simplemx_core::{Managed, Registry, Resource, Value, ValueType};
    use std::sync::atomic::{AtomicI64, Ordering};

    struct TestObject {
        foo: AtomicI64,
    }

    impl Managed for TestObject {
        fn resource() -> Resource<Self> {
            Resource::new("j256", "testObject")
                .getter("getFoo", ValueType::Integer, |t: &TestObject| {
                    Ok(Value::from(t.foo.load(Ordering::SeqCst)))
                })
                .setter("setFoo", ValueType::Integer, |t: &TestObject, v| {
                    t.foo.store(v.as_i64().unwrap_or_default(), Ordering::SeqCst);
                    Ok(())
                })
        }
    }

    fn endpoint() -> (Endpoint, Arc<Registry>) {
        let catalog = Arc::new(Catalog::new());
        let registry = Arc::new(Registry::with_publisher(catalog.clone()));
        let endpoint = Endpoint {
            dispatcher: Dispatcher::new(registry.clone()),
            catalog,
            stats: Arc::new(ListenerStats::new()),
            max_message_size: 4096,
            connections: Arc::new(Semaphore::new(1)),
        };
        (endpoint, registry)
    }

    #[test]
    fn catalog_follows_registry() {
        let (endpoint, registry) = endpoint();
        let obj = Arc::new(TestObject {
            foo: AtomicI64::new(1459243),
        });
        let name = registry.register(&obj).unwrap();
        assert_eq!(endpoint.catalog.names(), vec![name.clone()]);
        assert!(endpoint.catalog.get(&name).unwrap().attribute("foo").is_some());

        registry.unregister(&obj).unwrap();
        assert!(endpoint.catalog.is_empty());
    }

    #[test]
    fn respond_to_requests() {
        let (endpoint, registry) = endpoint();
        let obj = Arc::new(TestObject {
            foo: AtomicI64::new(1459243),
        });
        let name = registry.register(&obj).unwrap();

        assert_eq!(
            endpoint.respond(Request::Get {
                name: name.clone(),
                attribute: "foo".into(),
            }),
            Response::Value {
                value: json!(1459243)
            }
        );
        assert_eq!(
            endpoint.respond(Request::Set {
                name: name.clone(),
                attribute: "foo".into(),
                value: json!("12"),
            }),
            Response::Ok
        );
        assert_eq!(obj.foo.load(Ordering::SeqCst), 12);

        match endpoint.respond(Request::Invoke {
            name,
            operation: "missing".into(),
            args: Vec::new(),
            signature: None,
        }) {
            Response::Error { kind, .. } => assert_eq!(kind, "no_such_member"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn describe_unknown_is_not_found() {
        let (endpoint, _registry) = endpoint();
        let name: StructuredName = "j256:name=nobody".parse().unwrap();
        match endpoint.respond(Request::Describe { name }) {
            Response::Error { kind, .. } => assert_eq!(kind, "not_found"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn dropped_objects_leave_list_and_describe() {
        let (endpoint, registry) = endpoint();
        let obj = Arc::new(TestObject {
            foo: AtomicI64::new(1459243),
        });
        let name = registry.register(&obj).unwrap();
        drop(obj);

        assert_eq!(
            endpoint.respond(Request::List),
            Response::Names { names: Vec::new() }
        );
        match endpoint.respond(Request::Describe { name }) {
            Response::Error { kind, .. } => assert_eq!(kind, "not_found"),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(endpoint.catalog.is_empty());
    }
}

//! Counters the listener keeps about itself, exposed as a managed object.

use std::sync::atomic::{AtomicU64, Ordering};

use simplemx_core::{Managed, MethodSpec, Resource, Value, ValueType};

pub const STATS_DOMAIN: &str = "simplemx";
pub const STATS_OBJECT: &str = "Listener";

/// Connection and request counters of one management listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    connections_accepted: AtomicU64,
    requests_served: AtomicU64,
}

impl ListenerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub(crate) fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.connections_accepted.store(0, Ordering::Relaxed);
        self.requests_served.store(0, Ordering::Relaxed);
    }
}

fn counter(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Managed for ListenerStats {
    fn resource() -> Resource<Self> {
        Resource::new(STATS_DOMAIN, STATS_OBJECT)
            .description("Management listener counters")
            .method(
                MethodSpec::getter("getConnectionsAccepted", ValueType::Integer, |s: &Self| {
                    Ok(counter(s.connections_accepted()))
                })
                .description("Client connections accepted since the last reset"),
            )
            .method(
                MethodSpec::getter("getRequestsServed", ValueType::Integer, |s: &Self| {
                    Ok(counter(s.requests_served()))
                })
                .description("Requests answered since the last reset"),
            )
            .method(
                MethodSpec::operation("resetCounters", [], ValueType::Unit, |s: &Self, _| {
                    s.reset();
                    Ok(Value::Null)
                })
                .description("Zero both counters"),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplemx_core::{Dispatcher, Registry};
    use std::sync::Arc;

    #[test]
    fn counters_are_managed() {
        let stats = Arc::new(ListenerStats::new());
        let registry = Arc::new(Registry::new());
        let name = registry.register(&stats).unwrap();
        assert_eq!(name.as_str(), "simplemx:name=Listener");

        stats.record_connection();
        stats.record_request();
        stats.record_request();

        let dispatcher = Dispatcher::new(registry);
        assert_eq!(
            dispatcher.get_attribute(&name, "requestsServed").unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            dispatcher.get_attribute(&name, "connectionsAccepted").unwrap(),
            Value::Integer(1)
        );

        dispatcher.invoke(&name, "resetCounters", Vec::new()).unwrap();
        assert_eq!(stats.requests_served(), 0);
        assert_eq!(stats.connections_accepted(), 0);
    }

    #[test]
    fn counters_are_read_only() {
        let stats = Arc::new(ListenerStats::new());
        let registry = Arc::new(Registry::new());
        let name = registry.register(&stats).unwrap();

        let record = Dispatcher::new(registry).describe(&name).unwrap();
        assert_eq!(record.description, "Management listener counters");
        assert!(record.attributes.iter().all(|a| a.readable && !a.writable));
    }
}

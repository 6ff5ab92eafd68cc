//! Service name to handler mapping

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::WnsResult;
use crate::protocol::{Request, Response};

/// A stateless mapping from a decoded request to a response.
///
/// Handlers run synchronously on the dispatch task, so they should not block
/// for long.
pub trait ServiceHandler: Send + Sync {
    fn handle(&self, request: &Request) -> WnsResult<Response>;
}

impl<F> ServiceHandler for F
where
    F: Fn(&Request) -> WnsResult<Response> + Send + Sync,
{
    fn handle(&self, request: &Request) -> WnsResult<Response> {
        self(request)
    }
}

/// Registry of services a node answers.
///
/// Normally filled once at startup and only read afterwards; registration
/// takes `&self` so services can still be added while a node is running.
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ServiceHandler>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `service`, replacing any previous handler.
    ///
    /// Returns `true` if a handler was replaced.
    pub fn register(&self, service: impl Into<String>, handler: impl ServiceHandler + 'static) -> bool {
        let service = service.into();
        info!(%service, "Registering service handler");
        self.handlers
            .write()
            .insert(service, Arc::new(handler))
            .is_some()
    }

    /// Builder-style variant of [`ServiceRegistry::register`]
    pub fn with(self, service: impl Into<String>, handler: impl ServiceHandler + 'static) -> Self {
        self.register(service, handler);
        self
    }

    /// Look up the handler for `service`.
    ///
    /// `None` is not an error of the registry; the dispatcher decides what an
    /// unknown service means.
    pub fn lookup(&self, service: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.handlers.read().get(service).cloned()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.handlers.read().contains_key(service)
    }

    /// Registered service names, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WnsError;

    fn echo(request: &Request) -> WnsResult<Response> {
        Ok(Response::ok(&request.request_id, &request.input))
    }

    #[test]
    fn test_lookup_registered_service() {
        let registry = ServiceRegistry::new().with("Echo", echo);

        let handler = registry.lookup("Echo").expect("handler registered");
        let request = Request::new("1", "key", "Echo", "ping");
        let response = handler.handle(&request).unwrap();
        assert_eq!(response.output, "ping");
        assert_eq!(response.request_id, "1");
    }

    #[test]
    fn test_lookup_unknown_service_is_none() {
        let registry = ServiceRegistry::new().with("Echo", echo);
        assert!(registry.lookup("DoesNotExist").is_none());
        assert!(!registry.contains("DoesNotExist"));
    }

    #[test]
    fn test_register_replaces_existing() {
        let registry = ServiceRegistry::new();
        assert!(!registry.register("Echo", echo));
        assert!(registry.register("Echo", |_: &Request| -> WnsResult<Response> {
            Err(WnsError::Handler("replaced".to_string()))
        }));
        assert_eq!(registry.len(), 1);

        let request = Request::new("1", "key", "Echo", "");
        assert!(registry.lookup("Echo").unwrap().handle(&request).is_err());
    }

    #[test]
    fn test_services_sorted() {
        let registry = ServiceRegistry::new().with("Zeta", echo).with("Alpha", echo);
        assert_eq!(registry.services(), vec!["Alpha".to_string(), "Zeta".to_string()]);
    }
}

//! The handler registry: the external collaborator that resolves a job's
//! `class` to an invocable (§6).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// A handler invocable by class name. `invoke` takes the job's decoded
/// `args` and reports success or a human-readable failure message — it
/// never panics the caller; see [`crate::worker`] for how a panic inside a
/// handler implementation is caught and converted to a failure outcome
/// regardless.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run this handler against the given arguments.
    async fn invoke(&self, args: Vec<Value>) -> Result<(), String>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    async fn invoke(&self, args: Vec<Value>) -> Result<(), String> {
        (self.f)(args).await
    }
}

/// Wrap an async function/closure as a [`Handler`], for registering job
/// classes without a dedicated type.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// A lookup from `class` name to the [`Handler`] that runs it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("classes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        HandlerRegistry { handlers: HashMap::new() }
    }

    /// Register a handler under `class`, replacing any previous handler for
    /// that name. Consumes and returns `self` so registrations chain.
    pub fn register(mut self, class: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(class.into(), handler);
        self
    }

    /// Resolve `class` to its handler, if registered.
    pub fn resolve(&self, class: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(class).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_registered_class() {
        let registry = HandlerRegistry::new().register(
            "Echo",
            from_fn(|_args| async move { Ok(()) }),
        );
        assert!(registry.resolve("Echo").is_some());
        assert!(registry.resolve("Missing").is_none());
    }

    #[tokio::test]
    async fn invokes_the_wrapped_closure() {
        let handler = from_fn(|args: Vec<Value>| async move {
            if args.is_empty() {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        });
        assert_eq!(handler.invoke(vec![]).await, Err("boom".to_string()));
        assert_eq!(handler.invoke(vec![Value::Null]).await, Ok(()));
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Keyword arguments as materialized for a handler call.
pub type Kwargs = Map<String, Value>;

/// Raised when a job's `func_name` does not resolve to a registered
/// callable. Jobs hitting this are failed permanently, never retried.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("no callable registered for '{0}'")]
pub struct UnresolvedHandler(pub String);

/// A failure signalled by a handler. `message` lands in the result row's
/// exception column, `traceback` in its diagnostic column.
#[derive(Debug, Default)]
pub struct HandlerError {
    pub message: String,
    pub traceback: String,
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: String::new(),
        }
    }

    /// Capture both the display form and the debug rendering of an error.
    /// For eyre/anyhow-style reports the debug rendering carries the cause
    /// chain, which is the closest thing to a stack we can persist.
    pub fn from_error<E: std::fmt::Display + std::fmt::Debug>(error: E) -> Self {
        Self {
            message: format!("{error}"),
            traceback: format!("{error:?}"),
        }
    }
}

/// A callable a job can be dispatched to.
///
/// Handlers receive the job's positional arguments in order and its keyword
/// arguments folded into a map. The returned value is persisted as the
/// job's result; an `Err` is recorded as a failing attempt and fed to the
/// retry schedule.
#[async_trait]
pub trait Handler: Send + Sync + std::fmt::Debug {
    async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, HandlerError>;
}

struct FnHandler<F>(F);

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<Value>, Kwargs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, HandlerError> {
        (self.0)(args, kwargs).await
    }
}

/// Process-wide mapping from handler names to callables.
///
/// The registry is populated once by the application wiring layer and then
/// shared immutably with every runner; adding a job type is a registry
/// insertion. Resolution is pure: the same name yields the same callable
/// for the life of the process.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.to_owned(), handler);
    }

    /// Register a plain async function or closure under `name`.
    pub fn register_fn<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler(f)));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>, UnresolvedHandler> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| UnresolvedHandler(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

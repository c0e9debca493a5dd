use serde_json::json;

use dbqueue_core::HandlerRegistry;

/// The registry the stock runner binary ships with.
///
/// Deployments embedding dbqueue register their own job types on top of
/// this; the built-in entries exist so a fresh install can be smoke-tested
/// end to end before any application handlers are wired in.
pub fn base_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    // Round-trips its inputs through the store, for verifying connectivity
    // and argument encoding.
    registry.register_fn("dbqueue.echo", |args, kwargs| async move {
        Ok(json!({ "args": args, "kwargs": kwargs }))
    });

    registry
}

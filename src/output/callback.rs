// src/output/callback.rs

//! The one sanctioned place to read plain values out of outputs.

use std::future::Future;

tokio::task_local! {
    static CALLBACK_SCOPE: &'static str;
}

/// Run `fut` with direct output reads enabled. `name` identifies the
/// callback in diagnostics.
pub async fn run_in_callback_scope<F>(name: &'static str, fut: F) -> F::Output
where
    F: Future,
{
    CALLBACK_SCOPE.scope(name, fut).await
}

/// Whether the current task is inside [`run_in_callback_scope`].
pub fn in_callback_scope() -> bool {
    current_callback().is_some()
}

/// Name of the enclosing callback, if any.
pub fn current_callback() -> Option<&'static str> {
    CALLBACK_SCOPE.try_with(|name| *name).ok()
}

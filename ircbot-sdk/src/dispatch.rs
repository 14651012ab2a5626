//! Handler registry keyed by event [`Code`].
//!
//! Handlers are async closures taking a context value (the [`Client`] in
//! practice) and the shared [`Event`]. Each invocation runs in its own tokio
//! task, so a slow, failing or panicking handler never holds up the read loop
//! or the other handlers.
//!
//! [`Client`]: crate::client::Client

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::event::{Code, Event};

/// A registered callback.
pub type Handler<C> =
    Arc<dyn Fn(C, Arc<Event>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Ordered handler lists per code. Grows only; there is no removal.
pub struct Registry<C> {
    handlers: RwLock<HashMap<Code, Vec<Handler<C>>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Clone + Send + 'static> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `code`.
    pub fn register<F, Fut>(&self, code: impl Into<Code>, handler: F)
    where
        F: Fn(C, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler<C> = Arc::new(move |ctx, event| handler(ctx, event).boxed());
        self.handlers
            .write()
            .entry(code.into())
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered under `code`.
    pub fn count(&self, code: &Code) -> usize {
        self.handlers.read().get(code).map_or(0, Vec::len)
    }

    /// Start every handler registered for `event.code`, in registration order.
    ///
    /// Returns the spawned tasks; callers that don't care may drop them.
    /// Events without a code and codes without handlers spawn nothing.
    pub fn dispatch(&self, ctx: &C, event: Arc<Event>) -> Vec<JoinHandle<()>> {
        let Some(code) = event.code.clone() else {
            return Vec::new();
        };
        let handlers = match self.handlers.read().get(&code) {
            Some(list) => list.clone(),
            None => return Vec::new(),
        };

        handlers
            .into_iter()
            .map(|handler| {
                let ctx = ctx.clone();
                let event = event.clone();
                let code = code.clone();
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(async move { handler(ctx, event).await })
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(%code, error = %e, "Handler failed");
                        }
                        Err(panic) => {
                            let msg = panic
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "unknown panic".to_string());
                            tracing::error!(%code, panic = %msg, "Handler panicked");
                        }
                    }
                })
            })
            .collect()
    }
}

//! Request-scoped cancellation signal.
//!
//! The request owns the root signal. Each invocation runs under a child
//! that fires with its parent but can also be cancelled on its own, so a
//! timed-out invocation never cancels the bindings that run after it.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

/// Cancellation signal for a request or one invocation within it.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    parent: Option<Arc<Cancellation>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parent: None,
        }
    }

    /// A signal that fires when this one does, or when cancelled itself.
    pub fn child(&self) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Signal cancellation. Idempotent. Parents are unaffected.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// Resolves once this signal or any ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.tx.subscribe();
            // The sender lives in `self`, so the channel cannot close here.
            let own = async move {
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            };
            match &self.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

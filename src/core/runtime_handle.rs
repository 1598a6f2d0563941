use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::{
    constants::SHUTDOWN_MSG,
    core::{
        domain::RuntimeState,
        errors::{HarnessError, Result},
        traits::runtime::{Interpreter, RuntimeLoader},
    },
};

#[derive(Debug, Clone)]
enum Slot {
    Uninitialized,
    Loading,
    Ready(Arc<dyn Interpreter>),
    Failed(String),
}

impl Slot {
    fn state(&self) -> RuntimeState {
        match self {
            Slot::Uninitialized => RuntimeState::Uninitialized,
            Slot::Loading => RuntimeState::Loading,
            Slot::Ready(_) => RuntimeState::Ready,
            Slot::Failed(reason) => RuntimeState::Failed(reason.clone()),
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, Slot::Ready(_) | Slot::Failed(_))
    }
}

/// Owns the single embedded runtime of a session.
///
/// State only moves forward: `Uninitialized -> Loading -> Ready | Failed`.
/// A failed bootstrap is final; nothing retries it.
#[derive(Debug)]
pub struct RuntimeHandle {
    loader: Arc<dyn RuntimeLoader>,
    bootstrap_timeout: Duration,
    slot: Arc<watch::Sender<Slot>>,
}

impl RuntimeHandle {
    pub fn new(loader: Arc<dyn RuntimeLoader>, bootstrap_timeout: Duration) -> Self {
        let (slot, _) = watch::channel(Slot::Uninitialized);
        Self {
            loader,
            bootstrap_timeout,
            slot: Arc::new(slot),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.slot.borrow().state()
    }

    /// Starts the bootstrap, or joins the one already in flight.
    ///
    /// The bootstrap runs on its own task, so it finishes even if every
    /// caller stops waiting. Every caller observes the same outcome and
    /// only the first one ever reaches the loader.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut leader = false;
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Uninitialized) {
                *slot = Slot::Loading;
                leader = true;
                true
            } else {
                false
            }
        });

        if leader {
            self.spawn_bootstrap();
        }

        match self.settled().await {
            RuntimeState::Failed(reason) => Err(HarnessError::BootstrapFailed(reason)),
            _ => Ok(()),
        }
    }

    fn spawn_bootstrap(&self) {
        let loader = self.loader.clone();
        let slot = self.slot.clone();
        let timeout = self.bootstrap_timeout;

        tokio::spawn(async move {
            let mut pending = PendingBootstrap::new(&slot);
            tracing::info!("Bootstrapping runtime");
            let next = match load(loader.as_ref(), timeout).await {
                Ok(interpreter) => {
                    tracing::info!("Runtime ready");
                    Slot::Ready(interpreter)
                }
                Err(reason) => {
                    tracing::error!(reason = %reason, "Runtime bootstrap failed");
                    Slot::Failed(reason)
                }
            };
            pending.complete(next);
        });
    }

    /// Waits until the runtime is either ready or failed.
    ///
    /// Returns immediately with `Uninitialized` when nobody started the
    /// bootstrap.
    pub async fn settled(&self) -> RuntimeState {
        let mut rx = self.slot.subscribe();
        let outcome = rx
            .wait_for(|slot| slot.is_settled() || matches!(slot, Slot::Uninitialized))
            .await
            .map(|slot| slot.state());

        // The sender lives in `self`, so the channel cannot close here.
        outcome.unwrap_or_else(|_| self.state())
    }

    /// Returns the live interpreter. Never waits.
    pub fn get(&self) -> Result<Arc<dyn Interpreter>> {
        match &*self.slot.borrow() {
            Slot::Ready(interpreter) => Ok(interpreter.clone()),
            _ => Err(HarnessError::RuntimeNotReady),
        }
    }

    /// Replaces a wedged or lost interpreter with a fresh one.
    ///
    /// Callers must hold the execution gate; the old instance is shut
    /// down before the new one is loaded. A shutdown that lands while the
    /// replacement loads wins.
    #[tracing::instrument(skip(self))]
    pub async fn recycle(&self) -> Result<()> {
        let current = self.get()?;
        tracing::warn!("Recycling runtime");
        current.shutdown().await;

        let next = match load(self.loader.as_ref(), self.bootstrap_timeout).await {
            Ok(interpreter) => Slot::Ready(interpreter),
            Err(reason) => {
                tracing::error!(reason = %reason, "Runtime recycle failed");
                Slot::Failed(reason)
            }
        };
        let failure = match &next {
            Slot::Failed(reason) => Some(reason.clone()),
            _ => None,
        };

        let mut replaced = false;
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Ready(_)) {
                *slot = next.clone();
                replaced = true;
            }
            replaced
        });

        if !replaced {
            if let Slot::Ready(fresh) = next {
                fresh.shutdown().await;
            }
            return Err(HarnessError::RuntimeNotReady);
        }
        match failure {
            Some(reason) => Err(HarnessError::BootstrapFailed(reason)),
            None => {
                tracing::info!("Runtime recycled");
                Ok(())
            }
        }
    }

    /// Stops the interpreter for good. Later runs see the runtime as not
    /// ready.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let previous = self.slot.send_replace(Slot::Failed(SHUTDOWN_MSG.to_string()));
        if let Slot::Ready(interpreter) = previous {
            interpreter.shutdown().await;
        }
    }
}

async fn load(
    loader: &dyn RuntimeLoader,
    timeout: Duration,
) -> std::result::Result<Arc<dyn Interpreter>, String> {
    match tokio::time::timeout(timeout, loader.load()).await {
        Ok(Ok(interpreter)) => Ok(Arc::from(interpreter)),
        Ok(Err(HarnessError::BootstrapFailed(reason))) => Err(reason),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("bootstrap did not finish within {:?}", timeout)),
    }
}

/// Moves the slot out of `Loading` if the bootstrap task dies before it
/// finishes, e.g. when the loader panics or the runtime shuts down.
struct PendingBootstrap<'a> {
    slot: &'a watch::Sender<Slot>,
    done: bool,
}

impl<'a> PendingBootstrap<'a> {
    fn new(slot: &'a watch::Sender<Slot>) -> Self {
        Self { slot, done: false }
    }

    /// A shutdown requested while loading stands; the loaded instance is
    /// dropped instead.
    fn complete(&mut self, next: Slot) {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Loading) {
                *slot = next.clone();
                true
            } else {
                false
            }
        });
        self.done = true;
    }
}

impl Drop for PendingBootstrap<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("Bootstrap aborted before completion");
            self.slot.send_if_modified(|slot| {
                if matches!(slot, Slot::Loading) {
                    *slot = Slot::Failed("bootstrap aborted".to_string());
                    true
                } else {
                    false
                }
            });
        }
    }
}

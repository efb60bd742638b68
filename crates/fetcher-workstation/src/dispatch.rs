//! Caller-facing sequential context.
//!
//! The registry never invokes listener callbacks itself. It enqueues
//! [`Delivery`] items while holding its lock, so the queue order is the
//! transition order, and a single task drains the queue one item at a time.
//! Callers therefore never see concurrent callbacks, and every listener of a
//! transfer observes its transitions in the same order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fetcher_core::{FetchError, FetchListener, FetchOutput, Progress};

/// Deferred work run on the sequential context.
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// One unit of caller-facing work.
pub enum Delivery {
    Progress {
        listener: Arc<dyn FetchListener>,
        progress: Progress,
    },
    Complete {
        listener: Arc<dyn FetchListener>,
        result: Result<FetchOutput, FetchError>,
    },
    Task(DispatchTask),
}

impl Delivery {
    pub(crate) fn run(self) {
        match self {
            Self::Progress { listener, progress } => listener.on_progress(&progress),
            Self::Complete { listener, result } => listener.on_complete(result),
            Self::Task(task) => task(),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Task(_) => "task",
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Delivery").field(&self.label()).finish()
    }
}

/// Enqueuing side of the sequential context.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Draining side, consumed by [`run_dispatch_loop`].
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Dispatcher {
    pub fn channel() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchQueue { rx })
    }

    /// Enqueue a delivery.
    ///
    /// Once the loop has shut down the delivery runs inline on the calling
    /// thread instead, so terminal results are never lost.
    pub fn send(&self, delivery: Delivery) {
        if let Err(mpsc::error::SendError(delivery)) = self.tx.send(delivery) {
            tracing::debug!(
                target: "fetcher.workstation",
                kind = delivery.label(),
                "Dispatch loop closed, delivering inline"
            );
            run_guarded(delivery);
        }
    }

    pub fn progress(&self, listener: &Arc<dyn FetchListener>, progress: Progress) {
        self.send(Delivery::Progress {
            listener: Arc::clone(listener),
            progress,
        });
    }

    pub fn complete(
        &self,
        listener: Arc<dyn FetchListener>,
        result: Result<FetchOutput, FetchError>,
    ) {
        self.send(Delivery::Complete { listener, result });
    }

    pub fn task(&self, task: DispatchTask) {
        self.send(Delivery::Task(task));
    }
}

impl DispatchQueue {
    /// Take the next delivery without waiting (tests inspect the queue).
    #[cfg(test)]
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

fn run_guarded(delivery: Delivery) {
    let kind = delivery.label();
    if catch_unwind(AssertUnwindSafe(|| delivery.run())).is_err() {
        tracing::warn!(
            target: "fetcher.workstation",
            kind,
            "Listener callback panicked"
        );
    }
}

/// Drain deliveries until `shutdown` fires and the queue is empty.
///
/// After shutdown no further items are accepted; anything already queued is
/// still delivered.
pub async fn run_dispatch_loop(mut queue: DispatchQueue, shutdown: CancellationToken) {
    let mut closing = false;
    loop {
        tokio::select! {
            biased;

            next = queue.rx.recv() => match next {
                Some(delivery) => run_guarded(delivery),
                None => break,
            },

            () = shutdown.cancelled(), if !closing => {
                closing = true;
                queue.rx.close();
            }
        }
    }
    tracing::debug!(target: "fetcher.workstation", "Dispatch loop stopped");
}

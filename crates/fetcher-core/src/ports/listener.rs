//! Fetch listener port.
//!
//! A listener is the pair of callbacks a caller hands to `fetch`. Methods are
//! invoked on the workstation's single caller-facing sequential context, never
//! concurrently for the same token.

use tokio::sync::mpsc;

use crate::fetch::{FetchError, FetchOutput, Progress};

/// Receiver of progress and exactly one terminal result for one caller.
pub trait FetchListener: Send + Sync {
    /// Non-terminal progress. May be called zero or more times, never after
    /// `on_complete`.
    fn on_progress(&self, _progress: &Progress) {}

    /// The terminal result. Called exactly once.
    fn on_complete(&self, result: Result<FetchOutput, FetchError>);
}

/// Listener built from two closures.
pub struct CallbackListener<P, C> {
    on_progress: P,
    on_complete: C,
}

impl<P, C> FetchListener for CallbackListener<P, C>
where
    P: Fn(&Progress) + Send + Sync,
    C: Fn(Result<FetchOutput, FetchError>) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        (self.on_progress)(progress);
    }

    fn on_complete(&self, result: Result<FetchOutput, FetchError>) {
        (self.on_complete)(result);
    }
}

/// Build a listener from `on_progress` and `on_complete` closures.
pub const fn listener_fn<P, C>(on_progress: P, on_complete: C) -> CallbackListener<P, C>
where
    P: Fn(&Progress) + Send + Sync,
    C: Fn(Result<FetchOutput, FetchError>) + Send + Sync,
{
    CallbackListener {
        on_progress,
        on_complete,
    }
}

/// What a [`ChannelListener`] forwards.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Progress(Progress),
    Complete(Result<FetchOutput, FetchError>),
}

impl Notification {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Listener that forwards every notification into an unbounded channel.
///
/// Convenient for callers that prefer to `await` a result.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelListener {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FetchListener for ChannelListener {
    fn on_progress(&self, progress: &Progress) {
        let _ = self.tx.send(Notification::Progress(progress.clone()));
    }

    fn on_complete(&self, result: Result<FetchOutput, FetchError>) {
        let _ = self.tx.send(Notification::Complete(result));
    }
}

/// Wait for the terminal notification on a [`ChannelListener`] receiver,
/// skipping progress. Returns `None` if the listener was dropped unresolved.
pub async fn wait_for_result(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
) -> Option<Result<FetchOutput, FetchError>> {
    while let Some(notification) = rx.recv().await {
        if let Notification::Complete(result) = notification {
            return Some(result);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_callback_listener_invokes_closures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_progress = Arc::clone(&seen);
        let seen_complete = Arc::clone(&seen);

        let listener = listener_fn(
            move |p: &Progress| seen_progress.lock().unwrap().push(p.name().to_string()),
            move |r: Result<FetchOutput, FetchError>| {
                seen_complete
                    .lock()
                    .unwrap()
                    .push(format!("done:{}", r.is_ok()));
            },
        );

        listener.on_progress(&Progress::Loading);
        listener.on_complete(Err(FetchError::Cancelled));

        assert_eq!(*seen.lock().unwrap(), vec!["loading", "done:false"]);
    }

    #[tokio::test]
    async fn test_wait_for_result_skips_progress() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_progress(&Progress::Downloading { fraction: 0.5 });
        listener.on_complete(Err(FetchError::NotCached));

        let result = wait_for_result(&mut rx).await;
        assert_eq!(result, Some(Err(FetchError::NotCached)));
    }

    #[tokio::test]
    async fn test_wait_for_result_when_dropped() {
        let (listener, mut rx) = ChannelListener::new();
        drop(listener);
        assert_eq!(wait_for_result(&mut rx).await, None);
    }
}

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::debug;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(250);

/// Delivers only the last value pushed within a quiet window.
///
/// Every `push` aborts the pending timer and arms a new one; a value reaches
/// the receiver once `window` elapses without another push. Must be used from
/// within a tokio runtime.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    tx: mpsc::UnboundedSender<T>,
    pending: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                tx,
                pending: None,
            },
            rx,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn push(&mut self, value: T) {
        if self.cancel() {
            debug!("Debounced value superseded");
        }

        let tx = self.tx.clone();
        let window = self.window;
        self.pending = Some(tokio::spawn(async move {
            time::sleep(window).await;
            // receiver dropped means nobody is listening anymore
            let _ = tx.send(value);
        }));
    }

    /// Drops the pending value, if any. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

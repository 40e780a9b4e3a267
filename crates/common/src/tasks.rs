use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A background task owned by the supervisor: explicit cancellation plus a
/// bounded join, instead of ad hoc per-task sleeps. Cancellation is
/// cooperative; the task observes the watch receiver at its suspension
/// points.
pub struct TaskHandle {
    name: &'static str,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, rx) = watch::channel(false);
        let handle = tokio::spawn(f(rx));
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals cancellation and waits up to `timeout` for the task to
    /// finish; aborts it past the deadline.
    pub async fn shutdown(mut self, timeout: Duration) {
        let _ = self.cancel.send(true);
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(_) => debug!("task {} stopped", self.name),
            Err(_) => {
                warn!("task {} did not stop within {:?}, aborting", self.name, timeout);
                self.handle.abort();
            }
        }
    }
}

//! Cancellable delayed task.
//!
//! Scheduling replaces whatever is pending: the previous task is aborted
//! before the new one is spawned, so only the last call in a burst runs.

use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};

pub struct Debouncer {
    delay: Duration,
    handle: Handle,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration, handle: Handle) -> Self {
        Self {
            delay,
            handle,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

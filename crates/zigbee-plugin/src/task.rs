//! Single-slot background tasks owned by an adapter
//!
//! Starting a task aborts the one already in the slot, and dropping the slot
//! aborts whatever is still running, so no timer or read chain outlives the
//! adapter that owns it.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct TaskSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `future` in the slot, replacing any previous task
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Call `on_timeout` once after `delay` unless restarted or cancelled first
    pub fn start_timer<F>(&self, delay: Duration, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            on_timeout();
        });
    }

    /// Abort the task, returns whether it was still pending
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let make = {
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }) as Box<dyn FnOnce() + Send>
            }
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once() {
        let (count, make) = counter();
        let slot = TaskSlot::new();
        slot.start_timer(Duration::from_millis(300), make());
        assert!(slot.is_pending());

        tokio::time::sleep(Duration::from_millis(301)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
        assert!(!slot.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_pending_timer() {
        let (count, make) = counter();
        let slot = TaskSlot::new();
        slot.start_timer(Duration::from_millis(300), make());
        tokio::time::sleep(Duration::from_millis(200)).await;
        slot.start_timer(Duration::from_millis(300), make());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_abort() {
        let (count, make) = counter();
        let slot = TaskSlot::new();
        slot.start_timer(Duration::from_millis(300), make());
        assert!(slot.cancel());

        let dropped = TaskSlot::new();
        dropped.start_timer(Duration::from_millis(300), make());
        drop(dropped);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

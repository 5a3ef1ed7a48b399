//! Worker pools: one per queue.
//!
//! Each worker loops try-pop-and-execute, falling back to a bounded wait on
//! the pool's condition variable. The wait must stay bounded: even if a
//! wakeup is missed, every worker re-checks for work within 250 ms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::entry::EntryPair;
use crate::queue::{TaskQueue, TaskQueueStatus};
use crate::resources::TaskResource;

const WORKER_WAIT: Duration = Duration::from_millis(250);
const JOIN_POLL_STEP: Duration = Duration::from_millis(5);
const JOIN_POLL_MAX: Duration = Duration::from_millis(330);

/// A queue plus the coordination state for its fixed pool of workers.
pub struct Tasker<R: TaskResource> {
    queue: TaskQueue<R>,
    capacity: usize,
    finished: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: TaskResource> Tasker<R> {
    /// `worker_count` is both the resource cache size and the number of
    /// workers the pipeline will spawn for this queue.
    pub fn new(worker_count: usize) -> Self {
        Self {
            queue: TaskQueue::new(worker_count),
            capacity: worker_count,
            finished: AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &TaskQueue<R> {
        &self.queue
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self) -> TaskQueueStatus {
        self.queue.status()
    }

    /// True once `wait_until_finished` has joined every worker. Peer queues
    /// use this in their finish predicates.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Push a pair and wake one waiter if it could run right away.
    pub fn enqueue(&self, pair: EntryPair) {
        if self.queue.push(pair).is_ready() {
            self.notify_one();
        }
    }

    pub fn notify_one(&self) {
        self.wake.notify_one();
    }

    pub fn notify_all(&self) {
        self.wake.notify_all();
    }

    /// Hand the pool its worker threads. Called once per run before any
    /// waiting starts.
    pub fn adopt_workers(&self, handles: Vec<JoinHandle<()>>) {
        self.finished.store(false, Ordering::SeqCst);
        *self.lock_handles() = handles;
    }

    /// One worker's task loop. Runs until `will_abort` flips, or the queue
    /// drains while `may_finish` holds.
    pub fn worker_loop<A, E, W, F>(&self, will_abort: A, mut execute: E, may_wake: W, may_finish: F)
    where
        A: Fn() -> bool,
        E: FnMut(&mut R, &EntryPair) -> bool,
        W: Fn() -> bool,
        F: Fn(&TaskQueueStatus) -> bool,
    {
        while !will_abort() {
            if self
                .queue
                .pop_and_execute(|resource, pair| execute(resource, pair))
            {
                continue;
            }

            let status = self.queue.status();
            if status.is_done() && may_finish(&status) {
                break;
            }

            let guard = self
                .wake_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let _ = self
                .wake
                .wait_timeout_while(guard, WORKER_WAIT, |_| !may_wake());
        }
    }

    /// Broadcast, poll until every worker has exited (running `on_tick`
    /// between polls with an exponentially growing sleep), then join them
    /// and mark the pool finished.
    pub fn wait_until_finished(&self, mut on_tick: impl FnMut()) {
        self.notify_all();

        let handles = std::mem::take(&mut *self.lock_handles());

        let mut sleep = Duration::ZERO;
        while handles.iter().any(|handle| !handle.is_finished()) {
            std::thread::sleep(sleep);
            sleep = (sleep * 2).max(JOIN_POLL_STEP).min(JOIN_POLL_MAX);
            on_tick();
        }

        for handle in handles {
            // worker bodies catch their own panics, so a join error here
            // means the payload was already recorded
            let _ = handle.join();
        }

        self.finished.store(true, Ordering::SeqCst);
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, Side};
    use crate::resources::CopyResource;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn pair(tag: &str) -> EntryPair {
        EntryPair::new(
            Entry::new(Side::Source, true, format!("/src/{tag}"), 1),
            Entry::new(Side::Destination, true, format!("/dst/{tag}"), 1),
        )
    }

    #[test]
    fn loop_drains_queue_then_exits() {
        let tasker: Tasker<CopyResource> = Tasker::new(1);
        tasker.enqueue(pair("a"));
        tasker.enqueue(pair("b"));

        let executed = AtomicUsize::new(0);
        tasker.worker_loop(
            || false,
            |_, _| {
                executed.fetch_add(1, Ordering::SeqCst);
                true
            },
            || true,
            |_| true,
        );

        assert_eq!(executed.load(Ordering::SeqCst), 2);
        assert!(tasker.status().is_done());
    }

    #[test]
    fn abort_stops_the_loop_without_draining() {
        let tasker: Tasker<CopyResource> = Tasker::new(1);
        tasker.enqueue(pair("a"));

        tasker.worker_loop(|| true, |_, _| true, || true, |_| true);

        assert_eq!(tasker.status().queued, 1);
        assert_eq!(tasker.status().completed, 0);
    }

    #[test]
    fn finish_predicate_observed_after_drain() {
        let tasker: Tasker<CopyResource> = Tasker::new(1);
        tasker.enqueue(pair("a"));

        // may_finish sees a drained queue with one completion
        tasker.worker_loop(
            || false,
            |_, _| true,
            || true,
            |status| {
                assert!(status.is_done());
                assert_eq!(status.completed, 1);
                true
            },
        );
    }

    #[test]
    fn wait_until_finished_joins_spawned_workers() {
        let tasker: Arc<Tasker<CopyResource>> = Arc::new(Tasker::new(2));
        for index in 0..20 {
            tasker.enqueue(pair(&index.to_string()));
        }

        let executed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let tasker = Arc::clone(&tasker);
            let executed = Arc::clone(&executed);
            handles.push(std::thread::spawn(move || {
                tasker.worker_loop(
                    || false,
                    |_, _| {
                        executed.fetch_add(1, Ordering::SeqCst);
                        true
                    },
                    || true,
                    |_| true,
                );
            }));
        }

        tasker.adopt_workers(handles);
        assert!(!tasker.is_finished());

        let mut ticks = 0usize;
        tasker.wait_until_finished(|| ticks += 1);

        assert!(tasker.is_finished());
        assert_eq!(executed.load(Ordering::SeqCst), 20);
        assert!(tasker.status().is_done());
    }
}

//! Bounded resource pool plus pending-task queue.
//!
//! The cache of reusable resources is sized once at construction and caps
//! how many tasks can run at the same time. Any number of threads may call
//! [`TaskQueue::pop_and_execute`] in a loop: each call atomically pairs a
//! free resource with a pending entry pair, runs the task outside the lock,
//! and hands the resource back on every exit path, unwinding included.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::entry::EntryPair;
use crate::resources::TaskResource;

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskQueueStatus {
    /// Pending pairs not yet picked up.
    pub queued: usize,
    /// Size of the resource cache; equals the worker count.
    pub resource_count: usize,
    /// Resources currently checked out.
    pub busy: usize,
    /// Tasks finished since construction; only ever grows.
    pub completed: usize,
    /// Sum of the busy resources' progress gauges.
    pub progress_sum: u64,
}

impl TaskQueueStatus {
    /// A waiting worker could make progress right now.
    pub fn is_ready(&self) -> bool {
        self.queued > 0 && self.busy < self.resource_count
    }

    /// Nothing pending and nothing running.
    pub fn is_done(&self) -> bool {
        self.queued == 0 && self.busy == 0
    }
}

struct Slot<R> {
    /// `None` while a worker owns the resource.
    resource: Option<R>,
    /// Twin of the resource's own gauge, readable while it is checked out.
    progress: Arc<AtomicU64>,
}

struct QueueState<R> {
    pending: Vec<EntryPair>,
    slots: Vec<Slot<R>>,
}

pub struct TaskQueue<R: TaskResource> {
    state: Mutex<QueueState<R>>,
    completed: AtomicUsize,
}

impl<R: TaskResource> TaskQueue<R> {
    /// The resource cache is filled here and never grows or shrinks.
    pub fn new(resource_count: usize) -> Self {
        let slots = (0..resource_count)
            .map(|_| {
                let resource = R::new();
                let progress = resource.progress_handle();
                Slot {
                    resource: Some(resource),
                    progress,
                }
            })
            .collect();

        Self {
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                slots,
            }),
            completed: AtomicUsize::new(0),
        }
    }

    /// Enqueue a pair and return the status observed under the same lock.
    pub fn push(&self, pair: EntryPair) -> TaskQueueStatus {
        let mut state = self.lock_state();
        state.pending.push(pair);
        self.status_locked(&state)
    }

    /// Try to run one pending task. Returns `false` without blocking when
    /// the queue is empty or every resource is busy.
    ///
    /// `setup` runs before the task, `teardown` after it, and the resource
    /// is returned to the cache even if `execute` panics.
    pub fn pop_and_execute<F>(&self, execute: F) -> bool
    where
        F: FnOnce(&mut R, &EntryPair) -> bool,
    {
        let (index, resource, pair) = {
            let mut state = self.lock_state();

            let Some(index) = state.slots.iter().position(|slot| slot.resource.is_some()) else {
                return false;
            };
            if state.pending.is_empty() {
                return false;
            }

            // most-recent first; ordering is not part of the queue contract
            let pair = state.pending.pop().expect("pending checked non-empty");
            let resource = state.slots[index]
                .resource
                .take()
                .expect("slot checked free");
            (index, resource, pair)
        };

        let mut guard = SlotGuard {
            queue: self,
            index,
            resource: Some(resource),
        };

        let resource = guard.resource.as_mut().expect("held until drop");
        resource.setup(&pair);
        let _ = execute(resource, &pair);
        self.completed.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn status(&self) -> TaskQueueStatus {
        let state = self.lock_state();
        self.status_locked(&state)
    }

    fn status_locked(&self, state: &QueueState<R>) -> TaskQueueStatus {
        let mut busy = 0;
        let mut progress_sum = 0u64;
        for slot in &state.slots {
            if slot.resource.is_none() {
                busy += 1;
                progress_sum += slot.progress.load(Ordering::Relaxed);
            }
        }

        TaskQueueStatus {
            queued: state.pending.len(),
            resource_count: state.slots.len(),
            busy,
            completed: self.completed.load(Ordering::SeqCst),
            progress_sum,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState<R>> {
        // a poisoned lock must not leak a resource slot, so keep going
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the checked-out resource to its slot on drop, tearing it down
/// first.
struct SlotGuard<'a, R: TaskResource> {
    queue: &'a TaskQueue<R>,
    index: usize,
    resource: Option<R>,
}

impl<R: TaskResource> Drop for SlotGuard<'_, R> {
    fn drop(&mut self) {
        let mut resource = self.resource.take().expect("resource present until drop");
        resource.teardown();
        let mut state = self.queue.lock_state();
        debug_assert!(state.slots[self.index].resource.is_none());
        state.slots[self.index].resource = Some(resource);
    }
}

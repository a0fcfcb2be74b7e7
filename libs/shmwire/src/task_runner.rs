// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! A bounded blocking queue and the single worker thread that drains it.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::config::TaskRunnerConfig;
use crate::error::{Result, WireError};

struct QueueState<T> {
    items: VecDeque<T>,
    limit: usize,
}

/// FIFO queue with a pending-item limit. Producers never block; consumers
/// block in [`BoundedTaskQueue::pop_blocking`] until an item arrives.
pub struct BoundedTaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> BoundedTaskQueue<T> {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                limit,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues `item` unless the queue already holds `limit` items.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.items.len() >= state.limit {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Enqueues regardless of the limit.
    pub(crate) fn push_unbounded(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.available.notify_one();
    }

    pub fn pop_blocking(&self) -> T {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return item;
            }
            self.available.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Changes the limit. Items already queued stay queued.
    pub fn set_limit(&self, limit: usize) {
        self.state.lock().limit = limit;
    }

    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for BoundedTaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

enum WorkItem {
    Run(Task),
    Stop,
}

/// Runs submitted closures in order on one dedicated thread.
///
/// Dropping the runner does not wait: the worker is detached and finishes
/// whatever is already queued before it exits and releases the queue.
pub struct TaskRunner {
    queue: Arc<BoundedTaskQueue<WorkItem>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl TaskRunner {
    pub fn new() -> Result<Self> {
        Self::with_limit(usize::MAX)
    }

    pub fn with_limit(limit: usize) -> Result<Self> {
        let queue = Arc::new(BoundedTaskQueue::with_limit(limit));
        let worker_queue = Arc::clone(&queue);

        let worker = std::thread::Builder::new()
            .name("task-runner".to_string())
            .spawn(move || Self::worker_loop(worker_queue))
            .map_err(|e| {
                error!("[TaskRunner] Failed to spawn worker thread: {}", e);
                WireError::Io(e)
            })?;

        debug!("[TaskRunner] Started worker (limit {})", limit);
        Ok(Self {
            queue,
            worker: Some(worker),
        })
    }

    pub fn from_config(config: &TaskRunnerConfig) -> Result<Self> {
        Self::with_limit(config.queue_limit.unwrap_or(usize::MAX))
    }

    /// Queues `task`. Returns `false`, dropping the task, if the pending
    /// limit is reached.
    pub fn push<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(WorkItem::Run(Box::new(task)))
    }

    pub fn set_limit(&self, limit: usize) {
        self.queue.set_limit(limit);
    }

    /// Tasks queued but not yet started.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn worker_loop(queue: Arc<BoundedTaskQueue<WorkItem>>) {
        loop {
            match queue.pop_blocking() {
                WorkItem::Run(task) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        error!("[TaskRunner] Task panicked: {}", message);
                    }
                }
                WorkItem::Stop => break,
            }
        }
        debug!("[TaskRunner] Worker exiting");
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Detach; the worker owns its own reference to the queue.
        drop(self.worker.take());
        self.queue.push_unbounded(WorkItem::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_queue_limit() {
        let queue = BoundedTaskQueue::with_limit(2);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));
        assert_eq!(queue.len(), 2);

        queue.set_limit(3);
        assert!(queue.push(3));
        assert_eq!(queue.pop_blocking(), 1);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_push_unbounded_ignores_limit() {
        let queue = BoundedTaskQueue::with_limit(0);
        assert!(!queue.push(1));
        queue.push_unbounded(2);
        assert_eq!(queue.try_pop(), Some(2));
    }

    #[test]
    fn test_pop_blocking_wakes_on_push() {
        let queue = Arc::new(BoundedTaskQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.pop_blocking())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(queue.push("ready"));
        assert_eq!(consumer.join().unwrap(), "ready");
    }

    #[test]
    fn test_tasks_run_in_order() {
        let runner = TaskRunner::new().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..10 {
            let tx = tx.clone();
            assert!(runner.push(move || tx.send(i).unwrap()));
        }
        let seen: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_runner_rejects_past_limit() {
        let runner = TaskRunner::with_limit(1).unwrap();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);

        // Occupy the worker so later tasks stay queued.
        assert!(runner.push(move || {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
        }));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(runner.push(|| {}));
        assert!(!runner.push(|| {}));
        assert_eq!(runner.pending(), 1);

        gate_tx.send(()).unwrap();
    }

    #[test]
    fn test_panicking_task_does_not_stop_worker() {
        let runner = TaskRunner::new().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(runner.push(|| panic!("task failure")));
        assert!(runner.push(move || tx.send("after").unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
    }

    #[test]
    fn test_drop_drains_queue_then_releases_it() {
        let runner = TaskRunner::new().unwrap();
        let weak = Arc::downgrade(&runner.queue);
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            let tx = tx.clone();
            runner.push(move || {
                std::thread::sleep(Duration::from_millis(2));
                tx.send(i).unwrap();
            });
        }
        drop(runner);

        let seen: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while weak.upgrade().is_some() {
            assert!(Instant::now() < deadline, "worker never released the queue");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

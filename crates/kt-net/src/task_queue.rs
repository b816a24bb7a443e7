//! Queues up tasks to be run on another thread.
//!
//! Tasks are enqueued from any thread and drained by the thread that owns
//! the queue's context `Cx`. State a thread must keep to itself (the net
//! loop's socket and pending-request map, the GUI thread's song) lives in
//! `Cx`, so only the draining thread can ever touch it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

type Job<Cx> = Box<dyn FnOnce(&mut Cx) + Send>;

/// Completion handle for an enqueued task.
///
/// `wait` blocks until the task ran; a task that panicked resumes its
/// unwind on the waiting thread, and a queue torn down before running the
/// task yields `None`.
pub struct TaskFuture<R> {
    rx: Receiver<thread::Result<R>>,
}

impl<R> TaskFuture<R> {
    /// A future that is already fulfilled.
    pub fn ready(value: R) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(Ok(value));
        Self { rx }
    }

    /// Block until the task has run.
    pub fn wait(self) -> Option<R> {
        match self.rx.recv() {
            Ok(Ok(value)) => Some(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => None,
        }
    }

    /// Non-blocking poll.
    pub fn poll(&self) -> FuturePoll<R> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => FuturePoll::Ready(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(crossbeam_channel::TryRecvError::Empty) => FuturePoll::Pending,
            Err(crossbeam_channel::TryRecvError::Disconnected) => FuturePoll::Gone,
        }
    }
}

/// Result of a non-blocking [`TaskFuture::poll`].
pub enum FuturePoll<R> {
    /// The task ran; here is its value.
    Ready(R),
    /// The task has not run yet.
    Pending,
    /// The task will never run (its queue was torn down).
    Gone,
}

/// One-shot promise/future pair, used for pending RPC responses.
pub fn oneshot<R>() -> (Promise<R>, TaskFuture<R>) {
    let (tx, rx) = bounded(1);
    (Promise { tx }, TaskFuture { rx })
}

/// Fulfilling end of a [`oneshot`].
pub struct Promise<R> {
    tx: Sender<thread::Result<R>>,
}

impl<R> Promise<R> {
    pub fn fulfill(self, value: R) {
        // The waiter may have given up; that's fine.
        let _ = self.tx.send(Ok(value));
    }
}

/// A thread-safe FIFO of tasks bound for the thread that owns `Cx`.
pub struct TaskQueue<Cx> {
    tasks: Mutex<VecDeque<Job<Cx>>>,
}

impl<Cx> Default for TaskQueue<Cx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cx> TaskQueue<Cx> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a task; the returned future is fulfilled when the owning
    /// thread runs it.
    pub fn enqueue<R, F>(&self, func: F) -> TaskFuture<R>
    where
        F: FnOnce(&mut Cx) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let job: Job<Cx> = Box::new(move |cx| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| func(cx)));
            let _ = tx.send(result);
        });
        self.tasks.lock().expect("task queue poisoned").push_back(job);
        TaskFuture { rx }
    }

    /// Run all tasks queued at the time of the call, in FIFO order, on the
    /// calling thread. Tasks enqueued while draining run on the next drain.
    pub fn process_tasks(&self, cx: &mut Cx) {
        let drained = {
            let mut tasks = self.tasks.lock().expect("task queue poisoned");
            std::mem::take(&mut *tasks)
        };
        for job in drained {
            job(cx);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().expect("task queue poisoned").is_empty()
    }
}

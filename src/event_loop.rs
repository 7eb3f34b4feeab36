//! Single-threaded cooperative scheduler that owns every mutation of the
//! core's state. Consensus callbacks and background disk tasks never touch
//! `DurableMap`/`PendingTable` directly — they `post` a job and the loop
//! runs it.
//!
//! Implemented as the standard async-actor pattern: an unbounded MPSC
//! channel of boxed futures drained by exactly one task. Since only that
//! one task ever polls the channel, jobs run to completion strictly one at
//! a time in the order they were posted, without pinning an OS thread.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The side handed out to callers that need to enqueue work: consensus
/// callbacks, the gateway's sessions, anything not running on the loop
/// itself. Cheap to clone; safe to call from any thread.
#[derive(Clone)]
pub struct EventLoopHandle {
    sender: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
}

impl EventLoopHandle {
    /// Enqueues `job` to run on the loop thread. FIFO with respect to other
    /// calls made from the same caller.
    pub fn post<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The loop may already have shut down; a dropped job is equivalent
        // to one that ran after `stop()` was observed.
        let _ = self.sender.send(Box::pin(job));
    }

    /// Cancels pending accept and returns control to the worker. Safe to
    /// call from any thread, any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The cancellation token shared with the gateway's accept loop, so
    /// `stop()` tears down both at once.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct EventLoop {
    receiver: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
}

impl EventLoop {
    pub fn new() -> (Self, EventLoopHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = EventLoopHandle {
            sender,
            cancel: cancel.clone(),
        };
        (Self { receiver, cancel }, handle)
    }

    /// Consumes jobs until `stop()` is called or every handle has been
    /// dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("event loop stopping");
                    break;
                }
                job = self.receiver.recv() => {
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
            }
        }
    }
}

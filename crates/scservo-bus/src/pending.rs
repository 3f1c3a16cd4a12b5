use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use scservo_frame::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::bus::InboundSink;
use crate::error::{BusError, Result};

struct Pending {
    seq: u64,
    tx: oneshot::Sender<Result<Bytes>>,
    timer: JoinHandle<()>,
}

/// FIFO of requests awaiting a response from one servo.
///
/// Each entry is resolved exactly once: by the next response, or by its
/// deadline task with [`BusError::Timeout`]. An expired entry is gone from
/// the queue, so a late response cannot match it.
pub(crate) struct Inbox {
    queue: Mutex<VecDeque<Pending>>,
    next_seq: AtomicU64,
}

fn lock(queue: &Mutex<VecDeque<Pending>>) -> MutexGuard<'_, VecDeque<Pending>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inbox {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Append a request and arm its deadline.
    ///
    /// Must run inside a tokio runtime.
    pub(crate) fn enqueue(self: &Arc<Self>, timeout: Duration) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let inbox: Weak<Self> = Arc::downgrade(self);

        // The deadline task needs the queue lock, so it cannot observe the
        // queue before the entry is in.
        let mut queue = lock(&self.queue);
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(inbox) = inbox.upgrade() {
                inbox.expire(seq, timeout);
            }
        });
        queue.push_back(Pending { seq, tx, timer });

        PendingResponse { seq, rx }
    }

    /// Withdraw a request whose frame never made it onto the line.
    pub(crate) fn cancel(&self, seq: u64) {
        let mut queue = lock(&self.queue);
        if let Some(pos) = queue.iter().position(|p| p.seq == seq) {
            if let Some(pending) = queue.remove(pos) {
                pending.timer.abort();
            }
        }
    }

    /// Requests still waiting.
    pub(crate) fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    fn expire(&self, seq: u64, timeout: Duration) {
        let expired = {
            let mut queue = lock(&self.queue);
            queue
                .iter()
                .position(|p| p.seq == seq)
                .and_then(|pos| queue.remove(pos))
        };
        if let Some(pending) = expired {
            warn!(seq, ?timeout, "request timed out");
            let _ = pending.tx.send(Err(BusError::Timeout(timeout)));
        }
    }
}

impl InboundSink for Inbox {
    fn on_response(&self, status: Command, params: Bytes) {
        let next = lock(&self.queue).pop_front();
        match next {
            Some(pending) => {
                pending.timer.abort();
                trace!(seq = pending.seq, status = status.name(), len = params.len(), "request resolved");
                // The caller may have stopped waiting; nothing to do then.
                let _ = pending.tx.send(Ok(params));
            }
            None => debug!(len = params.len(), "response with no pending request dropped"),
        }
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        for pending in lock(&self.queue).drain(..) {
            pending.timer.abort();
        }
    }
}

/// A request on the wire whose response has not been awaited yet.
#[derive(Debug)]
pub struct PendingResponse {
    pub(crate) seq: u64,
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl PendingResponse {
    /// Wait for the response parameters, or the request's timeout.
    pub async fn wait(self) -> Result<Bytes> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(BusError::Disconnected(
                "request abandoned before a response arrived".to_string(),
            )),
        }
    }
}

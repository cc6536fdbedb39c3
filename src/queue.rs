//! Ordered work buffer shared by the pipeline stages.
//!
//! One serializer task owns the buffer; every mutation and every delivery
//! request arrives as a job on a single channel, so no locking is needed
//! around the ordering state. Two consumption modes are served:
//!
//! - [`Queue::get`] delivers the single highest-priority request at the
//!   moment of delivery (used by retriever workers),
//! - [`Queue::drain`] atomically swaps out the whole buffer, sorted (used
//!   by the resolver, which wants co-arriving requests as one batch).
//!
//! Priorities are re-evaluated at delivery time, so [`Queue::set_order`]
//! takes effect on anything still buffered. After [`Queue::finalize`] the
//! queue keeps accepting input but closes both delivery sides once it runs
//! empty, which lets downstream workers terminate cleanly.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::request::Request;

/// Handle to a serializer-task queue. Cloning shares the same buffer.
#[derive(Debug, Clone)]
pub struct Queue {
    jobs: mpsc::UnboundedSender<Job>,
}

enum Job {
    Enqueue(Request),
    EnqueueAll(Vec<Request>),
    Remove {
        id: String,
        reply: oneshot::Sender<Option<Request>>,
    },
    SetOrder {
        id: String,
        order: u32,
    },
    List {
        reply: oneshot::Sender<Vec<Request>>,
    },
    Get {
        reply: oneshot::Sender<Option<Request>>,
    },
    Drain {
        reply: oneshot::Sender<Option<Vec<Request>>>,
    },
    Finalize,
    Stop,
}

impl Queue {
    /// Creates the queue and spawns its serializer task.
    pub(crate) fn new(name: &'static str) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(serialize(name, rx));
        Self { jobs }
    }

    /// Inserts one request.
    pub fn enqueue(&self, request: Request) {
        let _ = self.jobs.send(Job::Enqueue(request));
    }

    /// Inserts a batch of requests in one mutation.
    pub fn enqueue_all(&self, requests: Vec<Request>) {
        if requests.is_empty() {
            return;
        }
        let _ = self.jobs.send(Job::EnqueueAll(requests));
    }

    /// Delivers the highest-priority request, waiting for one to arrive.
    /// Returns `None` once the queue has closed.
    pub async fn get(&self) -> Option<Request> {
        let (reply, rx) = oneshot::channel();
        if self.jobs.send(Job::Get { reply }).is_err() {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Atomically takes the entire buffered contents, sorted by priority,
    /// waiting until at least one request is buffered. Returns `None` once
    /// the queue has closed.
    pub async fn drain(&self) -> Option<Vec<Request>> {
        let (reply, rx) = oneshot::channel();
        if self.jobs.send(Job::Drain { reply }).is_err() {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Removes the buffered request whose id matches, returning it.
    pub async fn remove(&self, id: &str) -> Option<Request> {
        let (reply, rx) = oneshot::channel();
        if self
            .jobs
            .send(Job::Remove {
                id: id.to_string(),
                reply,
            })
            .is_err()
        {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Changes the sibling-order value of the buffered request whose id
    /// matches. Ordering is evaluated on current values at delivery time,
    /// so the change is visible to anything not yet delivered.
    pub fn set_order(&self, id: &str, order: u32) {
        let _ = self.jobs.send(Job::SetOrder {
            id: id.to_string(),
            order,
        });
    }

    /// Snapshot of the buffered requests, sorted by priority.
    pub async fn list(&self) -> Vec<Request> {
        let (reply, rx) = oneshot::channel();
        if self.jobs.send(Job::List { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Marks the queue as receiving no further meaningful input: once the
    /// buffer is empty both delivery sides close.
    pub fn finalize(&self) {
        let _ = self.jobs.send(Job::Finalize);
    }

    /// Closes both delivery sides immediately. Buffered requests are
    /// dropped.
    pub fn stop(&self) {
        let _ = self.jobs.send(Job::Stop);
    }
}

struct State {
    name: &'static str,
    buffer: Vec<Request>,
    get_waiters: VecDeque<oneshot::Sender<Option<Request>>>,
    drain_waiters: VecDeque<oneshot::Sender<Option<Vec<Request>>>>,
    draining: bool,
    closed: bool,
}

async fn serialize(name: &'static str, mut jobs: mpsc::UnboundedReceiver<Job>) {
    let mut state = State {
        name,
        buffer: Vec::new(),
        get_waiters: VecDeque::new(),
        drain_waiters: VecDeque::new(),
        draining: false,
        closed: false,
    };
    while let Some(job) = jobs.recv().await {
        state.apply(job);
        state.flush();
    }
    // All handles dropped: release anyone still parked.
    state.close();
}

impl State {
    fn apply(&mut self, job: Job) {
        match job {
            Job::Enqueue(request) => self.buffer.push(request),
            Job::EnqueueAll(requests) => self.buffer.extend(requests),
            Job::Remove { id, reply } => {
                let found = self
                    .buffer
                    .iter()
                    .position(|request| request.id() == id)
                    .map(|index| self.buffer.remove(index));
                let _ = reply.send(found);
            }
            Job::SetOrder { id, order } => {
                if let Some(request) = self.buffer.iter().find(|request| request.id() == id) {
                    request.set_order(order);
                }
            }
            Job::List { reply } => {
                let mut snapshot = self.buffer.clone();
                snapshot.sort_by(Request::order_cmp);
                let _ = reply.send(snapshot);
            }
            Job::Get { reply } => {
                if self.closed {
                    let _ = reply.send(None);
                } else {
                    self.get_waiters.push_back(reply);
                }
            }
            Job::Drain { reply } => {
                if self.closed {
                    let _ = reply.send(None);
                } else {
                    self.drain_waiters.push_back(reply);
                }
            }
            Job::Finalize => self.draining = true,
            Job::Stop => self.close(),
        }
    }

    /// Serves parked consumers from the buffer, then handles shutdown.
    fn flush(&mut self) {
        if self.closed {
            return;
        }
        while !self.buffer.is_empty() {
            if let Some(waiter) = self.drain_waiters.pop_front() {
                self.buffer.sort_by(Request::order_cmp);
                let batch = std::mem::take(&mut self.buffer);
                debug!(queue = self.name, count = batch.len(), "drained batch");
                if let Err(Some(batch)) = waiter.send(Some(batch)) {
                    // Consumer gave up; put the batch back for the next one.
                    self.buffer = batch;
                }
                continue;
            }
            if let Some(waiter) = self.get_waiters.pop_front() {
                let top = self.top_index();
                let request = self.buffer.remove(top);
                if let Err(Some(request)) = waiter.send(Some(request)) {
                    self.buffer.push(request);
                }
                continue;
            }
            break;
        }
        if self.draining && self.buffer.is_empty() {
            self.close();
        }
    }

    /// Index of the highest-priority buffered request.
    fn top_index(&self) -> usize {
        let mut top = 0;
        for index in 1..self.buffer.len() {
            if self.buffer[index].precedes(&self.buffer[top]) {
                top = index;
            }
        }
        top
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(queue = self.name, "queue closed");
        for waiter in self.get_waiters.drain(..) {
            let _ = waiter.send(None);
        }
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::container::WorkCounter;
    use crate::request::{Lineage, Request};

    fn requests(raws: &[&str]) -> Vec<Request> {
        let counter = WorkCounter::new();
        counter.add(raws.len() as i64);
        let arena = Lineage::new();
        raws.iter()
            .enumerate()
            .map(|(rank, raw)| {
                Request::root(
                    Arc::clone(&arena),
                    Url::parse(raw).unwrap(),
                    rank as u32,
                    counter.clone(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_get_delivers_highest_priority_first() {
        let queue = Queue::new("test");
        let mut rs = requests(&["http://h/a", "http://h/b", "http://h/c"]);
        // Enqueue out of submission order.
        rs.reverse();
        queue.enqueue_all(rs);
        assert_eq!(queue.get().await.unwrap().url().as_str(), "http://h/a");
        assert_eq!(queue.get().await.unwrap().url().as_str(), "http://h/b");
        assert_eq!(queue.get().await.unwrap().url().as_str(), "http://h/c");
    }

    #[tokio::test]
    async fn test_drain_takes_everything_sorted() {
        let queue = Queue::new("test");
        let mut rs = requests(&["http://h/a", "http://h/b"]);
        rs.reverse();
        queue.enqueue_all(rs);
        let batch = queue.drain().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].url().as_str(), "http://h/a");
        // Buffer is now empty; a finalized queue closes.
        queue.finalize();
        assert!(queue.drain().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_blocks_until_input_arrives() {
        let queue = Queue::new("test");
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        queue.enqueue_all(requests(&["http://h/a"]));
        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_closes_after_buffer_empties() {
        let queue = Queue::new("test");
        queue.enqueue_all(requests(&["http://h/a"]));
        queue.finalize();
        // The buffered item is still delivered.
        assert!(queue.get().await.is_some());
        // Then both delivery sides report closed.
        assert!(queue.get().await.is_none());
        assert!(queue.drain().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_releases_parked_consumers() {
        let queue = Queue::new("test");
        let parked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.stop();
        assert!(parked.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_by_id() {
        let queue = Queue::new("test");
        let rs = requests(&["http://h/a", "http://h/b"]);
        let target = rs[0].id();
        queue.enqueue_all(rs);
        let removed = queue.remove(&target).await.unwrap();
        assert_eq!(removed.url().as_str(), "http://h/a");
        assert_eq!(queue.list().await.len(), 1);
        assert!(queue.remove("no-such-id").await.is_none());
    }

    #[tokio::test]
    async fn test_set_order_reorders_pending_delivery() {
        let queue = Queue::new("test");
        let rs = requests(&["http://h/a", "http://h/b"]);
        let first = rs[0].id();
        queue.enqueue_all(rs);
        queue.set_order(&first, 99);
        assert_eq!(queue.get().await.unwrap().url().as_str(), "http://h/b");
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let queue = Queue::new("test");
        queue.enqueue_all(requests(&["http://h/a", "http://h/b"]));
        assert_eq!(queue.list().await.len(), 2);
        assert_eq!(queue.list().await.len(), 2);
    }
}

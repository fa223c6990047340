//! Outgoing request sequencing and response correlation
//!
//! The queue enforces the dispatch discipline; the callback map correlates
//! responses (and `requestCompleted` events) back to waiting callers. Both
//! are plain data owned by the server actor; no locking here.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;
use tsbridge_protocol::message::{Request, Seq};

use crate::outcome::ResponseOutcome;

/// How a request is admitted relative to its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueingClass {
    /// Strict-FIFO buffer-mutating commands; serialized with everything
    /// touching the same buffer.
    Fence,
    Normal,
    /// Admitted only while no Fence/Normal request is pending. Deliberately
    /// starvable under sustained Normal traffic.
    LowPriority,
}

/// A request that has not been written to the server yet.
pub struct QueuedRequest {
    pub request: Request,
    pub class: QueueingClass,
    pub expects_response: bool,
    pub is_async: bool,
    pub enqueue_time: Instant,
    pub completer: Option<oneshot::Sender<ResponseOutcome<Value>>>,
    pub cancel_on_resource: Option<String>,
    pub non_recoverable: bool,
    /// Dropped (never sent) when the request settles; the token watcher
    /// task selects on the paired receiver so it cannot outlive us.
    pub settled: Option<oneshot::Sender<()>>,
}

/// FIFO for Fence/Normal, a side lane for LowPriority.
#[derive(Default)]
pub struct RequestQueue {
    main: VecDeque<QueuedRequest>,
    low: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub fn push(&mut self, item: QueuedRequest) {
        match item.class {
            QueueingClass::LowPriority => self.low.push_back(item),
            _ => self.main.push_back(item),
        }
    }

    /// The next admissible request, if any.
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        if let Some(item) = self.main.pop_front() {
            return Some(item);
        }
        self.low.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.low.is_empty()
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.low.len()
    }

    /// Remove a queued request by seq (cancellation before dispatch).
    pub fn remove_seq(&mut self, seq: Seq) -> Option<QueuedRequest> {
        for lane in [&mut self.main, &mut self.low] {
            if let Some(index) = lane.iter().position(|item| item.request.seq == seq) {
                return lane.remove(index);
            }
        }
        None
    }

    /// Remove every queued request scoped to `path`.
    pub fn remove_for_resource(&mut self, path: &str) -> Vec<QueuedRequest> {
        let mut removed = Vec::new();
        for lane in [&mut self.main, &mut self.low] {
            let mut index = 0;
            while index < lane.len() {
                if lane[index].cancel_on_resource.as_deref() == Some(path) {
                    if let Some(item) = lane.remove(index) {
                        removed.push(item);
                    }
                } else {
                    index += 1;
                }
            }
        }
        removed
    }

    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.main.drain(..).chain(self.low.drain(..)).collect()
    }
}

/// A dispatched request awaiting its completion signal.
pub struct InflightEntry {
    pub command: String,
    pub enqueue_time: Instant,
    pub completer: oneshot::Sender<ResponseOutcome<Value>>,
    pub cancel_on_resource: Option<String>,
    pub non_recoverable: bool,
    pub settled: Option<oneshot::Sender<()>>,
}

impl InflightEntry {
    pub fn complete(self, outcome: ResponseOutcome<Value>) {
        // The caller may have gone away; that is not an error.
        let _ = self.completer.send(outcome);
    }
}

/// Correlation state, partitioned so one seq can never cross classes:
/// synchronous requests complete on a response, asynchronous ones on a
/// `requestCompleted` event.
#[derive(Default)]
pub struct CallbackMap {
    sync: HashMap<Seq, InflightEntry>,
    asynchronous: HashMap<Seq, InflightEntry>,
}

impl CallbackMap {
    pub fn insert(&mut self, seq: Seq, entry: InflightEntry, is_async: bool) {
        let map = if is_async {
            &mut self.asynchronous
        } else {
            &mut self.sync
        };
        if map.insert(seq, entry).is_some() {
            // A reused seq would cross-wire two requests.
            panic!("seq {seq} enqueued twice");
        }
    }

    pub fn take_sync(&mut self, seq: Seq) -> Option<InflightEntry> {
        self.sync.remove(&seq)
    }

    pub fn take_async(&mut self, seq: Seq) -> Option<InflightEntry> {
        self.asynchronous.remove(&seq)
    }

    pub fn contains_sync(&self, seq: Seq) -> bool {
        self.sync.contains_key(&seq)
    }

    /// Seqs of inflight requests scoped to `path`.
    pub fn seqs_for_resource(&self, path: &str) -> Vec<Seq> {
        self.sync
            .iter()
            .chain(self.asynchronous.iter())
            .filter(|(_, entry)| entry.cancel_on_resource.as_deref() == Some(path))
            .map(|(seq, _)| *seq)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.asynchronous.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sync.len() + self.asynchronous.len()
    }

    /// Complete everything with `Cancelled(reason)`. Used on server exit
    /// and dispose so no caller is left hanging.
    pub fn cancel_all(&mut self, reason: &str) {
        for (seq, entry) in self.sync.drain().chain(self.asynchronous.drain()) {
            warn!(seq, command = %entry.command, "cancelling pending request: {reason}");
            entry.complete(ResponseOutcome::Cancelled(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(seq: Seq, class: QueueingClass) -> QueuedRequest {
        QueuedRequest {
            request: Request::new(seq, "quickinfo", None),
            class,
            expects_response: true,
            is_async: false,
            enqueue_time: Instant::now(),
            completer: None,
            cancel_on_resource: None,
            non_recoverable: false,
            settled: None,
        }
    }

    #[test]
    fn test_fifo_within_main_lane() {
        let mut queue = RequestQueue::default();
        queue.push(queued(1, QueueingClass::Fence));
        queue.push(queued(2, QueueingClass::Normal));
        queue.push(queued(3, QueueingClass::Fence));

        let order: Vec<Seq> = std::iter::from_fn(|| queue.pop())
            .map(|item| item.request.seq)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_low_priority_waits_for_empty_main_lane() {
        let mut queue = RequestQueue::default();
        queue.push(queued(1, QueueingClass::LowPriority));
        queue.push(queued(2, QueueingClass::Normal));

        assert_eq!(queue.pop().unwrap().request.seq, 2);
        assert_eq!(queue.pop().unwrap().request.seq, 1);
    }

    #[test]
    fn test_remove_seq_from_either_lane() {
        let mut queue = RequestQueue::default();
        queue.push(queued(1, QueueingClass::Normal));
        queue.push(queued(2, QueueingClass::LowPriority));

        assert_eq!(queue.remove_seq(2).unwrap().request.seq, 2);
        assert!(queue.remove_seq(2).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_for_resource() {
        let mut queue = RequestQueue::default();
        let mut scoped = queued(1, QueueingClass::Normal);
        scoped.cancel_on_resource = Some("/p/a.ts".into());
        queue.push(scoped);
        queue.push(queued(2, QueueingClass::Normal));

        let removed = queue.remove_for_resource("/p/a.ts");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].request.seq, 1);
        assert_eq!(queue.len(), 1);
    }

    fn inflight(command: &str) -> (InflightEntry, oneshot::Receiver<ResponseOutcome<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            InflightEntry {
                command: command.into(),
                enqueue_time: Instant::now(),
                completer: tx,
                cancel_on_resource: None,
                non_recoverable: false,
                settled: None,
            },
            rx,
        )
    }

    #[test]
    fn test_callback_partitions_do_not_cross() {
        let mut callbacks = CallbackMap::default();
        let (entry, _rx) = inflight("geterr");
        callbacks.insert(5, entry, true);

        assert!(callbacks.take_sync(5).is_none());
        assert!(callbacks.take_async(5).is_some());
    }

    #[tokio::test]
    async fn test_cancel_all_flushes_every_entry() {
        let mut callbacks = CallbackMap::default();
        let (sync_entry, sync_rx) = inflight("references");
        let (async_entry, async_rx) = inflight("geterr");
        callbacks.insert(1, sync_entry, false);
        callbacks.insert(2, async_entry, true);

        callbacks.cancel_all("server disposed");
        assert!(callbacks.is_empty());
        assert_eq!(
            sync_rx.await.unwrap(),
            ResponseOutcome::Cancelled("server disposed".into())
        );
        assert_eq!(
            async_rx.await.unwrap(),
            ResponseOutcome::Cancelled("server disposed".into())
        );
    }
}

//! Ordered message buffer with fingerprint coalescing.
//!
//! The queue is the only resource shared between drivers. Intake (RPC
//! handlers, the pending-store pump) pushes; whichever driver is active
//! drains. Rapid consecutive sends under the same permission mode are
//! coalesced into one newline-joined batch so they land as a single turn
//! rather than N separate turns.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use handoff_core::PermissionMode;

/// Derives the coalescing fingerprint from a message's permission mode.
pub type FingerprintFn = Arc<dyn Fn(PermissionMode) -> String + Send + Sync>;

/// Immediate-dispatch callback invoked synchronously on every `push`.
pub type OnMessageFn = Arc<dyn Fn(&str, PermissionMode) + Send + Sync>;

/// One buffered user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    /// Message body.
    pub message: String,
    /// Permission mode the message was sent under.
    pub mode: PermissionMode,
    /// Coalescing fingerprint derived from `mode`.
    pub hash: String,
    /// Context-reset boundary: everything queued before this item was
    /// discarded atomically with its push.
    pub isolate: bool,
    /// Upstream id for cross-device discard bookkeeping, when the message
    /// came through the remote store.
    pub local_id: Option<String>,
}

/// The unit handed to a driver: one or more coalesced messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageBatch {
    /// Newline-joined message bodies, in arrival order.
    pub message: String,
    /// Permission mode shared by every message in the batch.
    pub mode: PermissionMode,
    /// Whether the batch starts at an explicit context-reset boundary.
    pub isolate: bool,
    /// The shared fingerprint.
    pub hash: String,
}

/// Ordered buffer of outbound user messages.
pub struct MessageQueue {
    fingerprint: FingerprintFn,
    items: Mutex<Vec<QueueItem>>,
    on_message: Mutex<Option<OnMessageFn>>,
    notify: Notify,
}

impl MessageQueue {
    /// Create a queue with the given fingerprint function.
    pub fn new(fingerprint: FingerprintFn) -> Self {
        Self {
            fingerprint,
            items: Mutex::new(Vec::new()),
            on_message: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Create a queue fingerprinting by the mode's wire name.
    pub fn with_default_fingerprint() -> Self {
        Self::new(Arc::new(|mode: PermissionMode| mode.as_str().to_owned()))
    }

    /// Append a message.
    ///
    /// If an immediate-dispatch callback is installed it is invoked
    /// synchronously, in addition to the enqueue.
    pub fn push(&self, message: impl Into<String>, mode: PermissionMode) {
        self.push_item(message.into(), mode, false, None);
    }

    /// Append a message that was committed upstream under `local_id`.
    pub fn push_with_local_id(
        &self,
        message: impl Into<String>,
        mode: PermissionMode,
        local_id: impl Into<String>,
    ) {
        self.push_item(message.into(), mode, false, Some(local_id.into()));
    }

    /// Atomically clear the queue, then append `message` as an isolate
    /// boundary. Models an explicit context-reset command that must never be
    /// merged with anything queued earlier.
    pub fn push_isolate_and_clear(&self, message: impl Into<String>, mode: PermissionMode) {
        let message = message.into();
        let hash = (self.fingerprint)(mode);
        {
            let mut items = self.items.lock();
            items.clear();
            items.push(QueueItem {
                message,
                mode,
                hash,
                isolate: true,
                local_id: None,
            });
        }
        self.notify.notify_waiters();
    }

    fn push_item(
        &self,
        message: String,
        mode: PermissionMode,
        isolate: bool,
        local_id: Option<String>,
    ) {
        let hash = (self.fingerprint)(mode);
        {
            let mut items = self.items.lock();
            items.push(QueueItem {
                message: message.clone(),
                mode,
                hash,
                isolate,
                local_id,
            });
        }
        // Invoke the callback outside the items lock so it may re-enter
        // queue mutation methods.
        let callback = self.on_message.lock().clone();
        if let Some(callback) = callback {
            callback(&message, mode);
        }
        self.notify.notify_waiters();
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Clear the queue. Idempotent.
    pub fn reset(&self) {
        self.items.lock().clear();
    }

    /// Upstream local ids of every currently queued committed message.
    pub fn committed_local_ids(&self) -> Vec<String> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| item.local_id.clone())
            .collect()
    }

    /// Install or remove the immediate-dispatch callback.
    ///
    /// At most one callback is active at a time; a new registration replaces
    /// the previous one.
    pub fn set_on_message(&self, callback: Option<OnMessageFn>) {
        *self.on_message.lock() = callback;
    }

    /// Suspend until the queue is non-empty or `cancel` fires.
    ///
    /// On wake, dequeues all leading items sharing the first item's
    /// fingerprint and returns them newline-joined as one batch. Returns
    /// `None` if cancelled before any message arrived.
    pub async fn wait_for_batch(&self, cancel: &CancellationToken) -> Option<MessageBatch> {
        loop {
            // Register interest before checking, so a push that lands
            // between the check and the await still wakes us.
            let notified = self.notify.notified();
            if let Some(batch) = self.try_drain() {
                return Some(batch);
            }
            tokio::select! {
                () = cancel.cancelled() => return None,
                () = notified => {}
            }
        }
    }

    /// Dequeue the leading same-fingerprint run, if any.
    fn try_drain(&self) -> Option<MessageBatch> {
        let mut items = self.items.lock();
        let first = items.first()?;
        let hash = first.hash.clone();
        let mode = first.mode;

        let run_len = items
            .iter()
            .take_while(|item| item.hash == hash)
            .count();
        let run: Vec<QueueItem> = items.drain(..run_len).collect();
        drop(items);

        let isolate = run.iter().any(|item| item.isolate);
        let message = run
            .iter()
            .map(|item| item.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Some(MessageBatch {
            message,
            mode,
            isolate,
            hash,
        })
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn queue() -> MessageQueue {
        MessageQueue::with_default_fingerprint()
    }

    #[tokio::test]
    async fn push_and_drain_single() {
        let q = queue();
        q.push("hello", PermissionMode::Default);

        let batch = q.wait_for_batch(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch.message, "hello");
        assert_eq!(batch.mode, PermissionMode::Default);
        assert!(!batch.isolate);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn coalesces_same_mode_run() {
        let q = queue();
        q.push("one", PermissionMode::Plan);
        q.push("two", PermissionMode::Plan);
        q.push("three", PermissionMode::Plan);

        let batch = q.wait_for_batch(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch.message, "one\ntwo\nthree");
        assert_eq!(batch.mode, PermissionMode::Plan);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn coalescing_stops_at_mode_change() {
        let q = queue();
        q.push("one", PermissionMode::Plan);
        q.push("two", PermissionMode::Plan);
        q.push("three", PermissionMode::AcceptEdits);

        let cancel = CancellationToken::new();
        let batch = q.wait_for_batch(&cancel).await.unwrap();
        assert_eq!(batch.message, "one\ntwo");
        assert_eq!(q.len(), 1);

        let batch = q.wait_for_batch(&cancel).await.unwrap();
        assert_eq!(batch.message, "three");
        assert_eq!(batch.mode, PermissionMode::AcceptEdits);
    }

    #[tokio::test]
    async fn isolate_discards_prior_entries() {
        let q = queue();
        q.push("stale", PermissionMode::Default);
        q.push("also stale", PermissionMode::Default);
        q.push_isolate_and_clear("fresh start", PermissionMode::Default);

        assert_eq!(q.len(), 1);
        let batch = q.wait_for_batch(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch.message, "fresh start");
        assert!(batch.isolate);
    }

    #[tokio::test]
    async fn cancelled_before_any_message_returns_none() {
        let q = queue();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(q.wait_for_batch(&cancel).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_on_push_while_suspended() {
        let q = Arc::new(queue());
        let cancel = CancellationToken::new();

        let waiter = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.wait_for_batch(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.push("late", PermissionMode::Default);

        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch.message, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wakes_suspended_waiter() {
        let q = Arc::new(queue());
        let cancel = CancellationToken::new();

        let waiter = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.wait_for_batch(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[test]
    fn on_message_fires_synchronously() {
        let q = queue();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        q.set_on_message(Some(Arc::new(move |msg, mode| {
            assert_eq!(msg, "ping");
            assert_eq!(mode, PermissionMode::Plan);
            let _ = seen.fetch_add(1, Ordering::SeqCst);
        })));

        q.push("ping", PermissionMode::Plan);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Enqueued in addition to the dispatch.
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn on_message_can_be_removed() {
        let q = queue();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        q.set_on_message(Some(Arc::new(move |_, _| {
            let _ = seen.fetch_add(1, Ordering::SeqCst);
        })));
        q.set_on_message(None);

        q.push("ping", PermissionMode::Default);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_reenter_queue_mutation() {
        let q = Arc::new(queue());
        let inner = Arc::clone(&q);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        q.set_on_message(Some(Arc::new(move |_, _| {
            // First dispatch resets the queue; must not deadlock or corrupt.
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                inner.reset();
            }
        })));

        q.push("a", PermissionMode::Default);
        assert!(q.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_is_idempotent() {
        let q = queue();
        q.push("a", PermissionMode::Default);
        q.reset();
        q.reset();
        assert!(q.is_empty());
    }

    #[test]
    fn committed_local_ids_only_lists_tagged_items() {
        let q = queue();
        q.push("plain", PermissionMode::Default);
        q.push_with_local_id("synced", PermissionMode::Default, "id-1");
        q.push_with_local_id("synced2", PermissionMode::Default, "id-2");

        assert_eq!(q.committed_local_ids(), vec!["id-1", "id-2"]);
    }

    #[tokio::test]
    async fn custom_fingerprint_controls_coalescing() {
        // Collapse every mode into one bucket: everything coalesces.
        let q = MessageQueue::new(Arc::new(|_| "same".to_owned()));
        q.push("a", PermissionMode::Default);
        q.push("b", PermissionMode::Plan);

        let batch = q.wait_for_batch(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch.message, "a\nb");
        assert_eq!(batch.hash, "same");
    }
}

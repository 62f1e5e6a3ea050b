//! Wait/race coordinator.
//!
//! A driver that wants the next batch cannot just block on the queue: the
//! upstream store may hold a pending message that only materializes after a
//! metadata change, and the whole wait must unwind promptly on cancellation.
//! [`next_message_batch`] loops over a cancellable two-way race between the
//! queue and the metadata signal, with exactly-once cleanup of the derived
//! cancellation scope on every exit path.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::queue::{MessageBatch, MessageQueue};

/// Wait for the next message batch.
///
/// - Fast path: a non-empty queue is drained immediately, without touching
///   `pop_pending` or racing anything.
/// - Otherwise `pop_pending` gets one best-effort chance to materialize an
///   upstream pending message into the queue; its boolean result carries no
///   control-flow weight beyond that re-check.
/// - Still empty: race the queue against `wait_for_metadata_update` under a
///   child token of `cancel`. The child scope is cancelled exactly once when
///   the race resolves (the loser is told to stop), including when `cancel`
///   fires concurrently with the race setup.
/// - A `true` metadata result means "something changed upstream": loop and
///   re-check. A `false` result is terminal.
///
/// Returns `None` on cancellation or a terminal metadata signal.
pub async fn next_message_batch<P, PF, W, WF>(
    queue: &MessageQueue,
    cancel: &CancellationToken,
    mut pop_pending: P,
    mut wait_for_metadata_update: W,
) -> Option<MessageBatch>
where
    P: FnMut() -> PF,
    PF: Future<Output = bool>,
    W: FnMut(CancellationToken) -> WF,
    WF: Future<Output = bool>,
{
    loop {
        if cancel.is_cancelled() {
            return None;
        }

        if !queue.is_empty() {
            return queue.wait_for_batch(cancel).await;
        }

        let _ = pop_pending().await;

        if cancel.is_cancelled() {
            return None;
        }
        if !queue.is_empty() {
            return queue.wait_for_batch(cancel).await;
        }

        // Race the queue against the metadata signal under a derived scope.
        // The drop guard cancels the scope on every exit path, so the losing
        // branch is always told to stop and never more than once.
        let scope = cancel.child_token();
        let _guard = scope.clone().drop_guard();
        tokio::select! {
            batch = queue.wait_for_batch(&scope) => return batch,
            ok = wait_for_metadata_update(scope.clone()) => {
                if !ok {
                    return None;
                }
                // Metadata changed; re-check the pending/queue state.
            }
        }
    }
}

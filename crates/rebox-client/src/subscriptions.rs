//! Push subscriptions on top of the store's insert channel.
//!
//! Each [`Subscription`] owns one forwarding task that decodes matching
//! [`RowInsert`](rebox_store::RowInsert) events and hands them to a callback.
//! Dropping the guard stops the task and releases the channel receiver.

use rebox_store::{RealtimeHub, Record};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop receiving events. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Forward every inserted `R` accepted by `filter` to `callback`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn forward<R, P, F>(hub: &RealtimeHub, filter: P, mut callback: F) -> Subscription
where
    R: Record,
    P: Fn(&R) -> bool + Send + 'static,
    F: FnMut(R) + Send + 'static,
{
    let mut rx = hub.subscribe();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(record) = event.decode::<R>() {
                        if filter(&record) {
                            callback(record);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(table = R::COLLECTION, skipped, "subscription lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    Subscription { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rebox_store::{Message, RowInsert};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn message(id: &str, match_id: &str) -> Message {
        Message {
            id: id.into(),
            match_id: match_id.into(),
            sender_id: "u1".into(),
            text: "hey".into(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn forwards_only_accepted_rows() {
        let hub = RealtimeHub::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = forward(
            &hub,
            |m: &Message| m.match_id == "m1",
            move |m: Message| {
                let _ = tx.send(m.id);
            },
        );
        assert!(sub.is_active());

        hub.publish(RowInsert::new(&message("x1", "m2")).unwrap());
        hub.publish(RowInsert::new(&message("x2", "m1")).unwrap());

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("x2"));
    }

    #[tokio::test]
    async fn dropping_releases_the_receiver() {
        let hub = RealtimeHub::new(16);
        let sub = forward(&hub, |_: &Message| true, |_: Message| {});
        assert_eq!(hub.receiver_count(), 1);

        sub.unsubscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            while hub.receiver_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}

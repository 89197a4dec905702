//! Likes, matches and chat.
//!
//! A pair of users moves from no interaction, to a one-sided like, to a
//! match once each has liked an item of the other. Matches are only ever
//! created by [`MatchService::check_for_match`], which `record_like` runs
//! after every new like. Both likes and matches are protected by unique keys
//! in the store, so concurrent evaluations of the same pair end with exactly
//! one match and the losers observe a conflict that is reported as `None`.

use std::sync::Arc;

use chrono::Utc;
use rebox_shared::validation::validate_message_text;
use rebox_shared::{generate_id, ValidationError};
use rebox_store::{Dislike, Filter, Like, Match, Message, Patch, Store};
use tracing::{debug, info};

use super::{append_once, timestamp_value, tolerate_missing};
use crate::error::{Result, ServiceError};
use crate::subscriptions::{forward, Subscription};

pub struct MatchService<S> {
    store: Arc<S>,
}

impl<S: Store> MatchService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record that `from_user_id` liked `to_item_id` (owned by
    /// `to_user_id`) and return the match this completes, if any.
    ///
    /// Liking the same item twice is a no-op returning `None`.
    pub async fn record_like(
        &self,
        from_user_id: &str,
        to_item_id: &str,
        to_user_id: &str,
    ) -> Result<Option<Match>> {
        if from_user_id == to_user_id {
            return Err(ValidationError::Rule("You cannot like your own item".into()).into());
        }

        let already = self
            .store
            .count_where::<Like>(
                &Filter::new()
                    .eq("fromUserId", from_user_id)
                    .eq("toItemId", to_item_id),
            )
            .await?;
        if already > 0 {
            debug!(from_user_id, to_item_id, "item already liked");
            return Ok(None);
        }

        let like = Like {
            id: generate_id(),
            from_user_id: from_user_id.to_string(),
            to_item_id: to_item_id.to_string(),
            to_user_id: to_user_id.to_string(),
            created_at: Utc::now(),
        };
        if !append_once(self.store.as_ref(), &like).await? {
            return Ok(None);
        }
        debug!(from_user_id, to_item_id, to_user_id, "like recorded");

        self.check_for_match(from_user_id, to_user_id).await
    }

    /// Record a pass. The item never shows up in the user's feed again.
    pub async fn record_dislike(&self, from_user_id: &str, to_item_id: &str) -> Result<()> {
        let already = self
            .store
            .count_where::<Dislike>(
                &Filter::new()
                    .eq("fromUserId", from_user_id)
                    .eq("toItemId", to_item_id),
            )
            .await?;
        if already > 0 {
            debug!(from_user_id, to_item_id, "item already disliked");
            return Ok(());
        }

        let dislike = Dislike {
            id: generate_id(),
            from_user_id: from_user_id.to_string(),
            to_item_id: to_item_id.to_string(),
            created_at: Utc::now(),
        };
        append_once(self.store.as_ref(), &dislike).await?;
        Ok(())
    }

    async fn match_between(&self, user_a: &str, user_b: &str) -> Result<Option<Match>> {
        let candidates: Vec<Match> = self
            .store
            .find_where(&Filter::new().contains("userIds", user_a))
            .await?;
        Ok(candidates.into_iter().find(|m| m.involves(user_b)))
    }

    /// Create the match for `(user_a, user_b)` if both have liked an item of
    /// the other and they are not matched yet.
    ///
    /// `item_ids[0]` is the item of `user_a` liked by `user_b` and
    /// `item_ids[1]` the item of `user_b` liked by `user_a`.
    pub async fn check_for_match(&self, user_a: &str, user_b: &str) -> Result<Option<Match>> {
        if user_a == user_b {
            return Ok(None);
        }
        if self.match_between(user_a, user_b).await?.is_some() {
            return Ok(None);
        }

        let mutual = self.store.mutual_likes(user_a, user_b).await?;
        let (Some(item_a), Some(item_b)) = (mutual.item_a_id, mutual.item_b_id) else {
            return Ok(None);
        };

        let new_match = Match {
            id: generate_id(),
            user_ids: [user_a.to_string(), user_b.to_string()],
            item_ids: [item_a, item_b],
            created_at: Utc::now(),
            last_message_at: None,
        };
        if !append_once(self.store.as_ref(), &new_match).await? {
            return Ok(None);
        }

        info!(match_id = %new_match.id, user_a, user_b, "match created");
        Ok(Some(new_match))
    }

    /// Matches of `user_id`, most recent activity first.
    pub async fn get_matches(&self, user_id: &str) -> Result<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .store
            .find_where(&Filter::new().contains("userIds", user_id))
            .await?;
        matches.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        Ok(matches)
    }

    pub async fn get_match_by_id(&self, match_id: &str) -> Result<Option<Match>> {
        Ok(self.store.find_one(match_id).await?)
    }

    /// Messages of a match, oldest first.
    pub async fn get_messages(&self, match_id: &str) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .store
            .find_where(&Filter::new().eq("matchId", match_id))
            .await?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    pub async fn send_message(&self, match_id: &str, sender_id: &str, text: &str) -> Result<Message> {
        validate_message_text(text)?;

        let m = self
            .get_match_by_id(match_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("match", match_id))?;
        if !m.involves(sender_id) {
            return Err(ServiceError::Forbidden(
                "Only participants can write in this chat".into(),
            ));
        }

        let message = Message {
            id: generate_id(),
            match_id: match_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
            is_read: false,
        };
        self.store.append(&message).await?;

        let patch = Patch::new().set("lastMessageAt", timestamp_value(&message.created_at));
        let result = self.store.update_where::<Match>(match_id, patch).await;
        tolerate_missing(result, "matches", match_id)?;

        debug!(match_id, sender_id, message_id = %message.id, "message sent");
        Ok(message)
    }

    /// Mark every unread message of the match not written by `reader_id` as
    /// read. Returns how many changed.
    pub async fn mark_messages_as_read(&self, match_id: &str, reader_id: &str) -> Result<usize> {
        let unread = Filter::new()
            .eq("matchId", match_id)
            .ne("senderId", reader_id)
            .eq("isRead", false);
        let changed = self
            .store
            .update_many::<Message>(&unread, Patch::new().set("isRead", true))
            .await?;
        if changed > 0 {
            debug!(match_id, reader_id, changed, "messages marked as read");
        }
        Ok(changed)
    }

    /// Unread messages addressed to `user_id` across all their matches.
    pub async fn get_unread_count(&self, user_id: &str) -> Result<usize> {
        let match_ids: Vec<String> = self
            .get_matches(user_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        if match_ids.is_empty() {
            return Ok(0);
        }

        let unread = Filter::new()
            .is_in("matchId", match_ids)
            .ne("senderId", user_id)
            .eq("isRead", false);
        Ok(self.store.count_where::<Message>(&unread).await?)
    }

    /// Likes given by `user_id`.
    pub async fn get_likes(&self, user_id: &str) -> Result<Vec<Like>> {
        Ok(self
            .store
            .find_where(&Filter::new().eq("fromUserId", user_id))
            .await?)
    }

    fn unsupported(&self, operation: &'static str) -> ServiceError {
        ServiceError::Unsupported {
            backend: self.store.backend(),
            operation,
        }
    }

    /// Call `on_message` for every new message in `match_id`.
    ///
    /// Only available on backends with push notifications.
    pub fn subscribe_to_messages<F>(&self, match_id: &str, on_message: F) -> Result<Subscription>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let hub = self
            .store
            .realtime()
            .ok_or_else(|| self.unsupported("subscribe_to_messages"))?;
        let match_id = match_id.to_string();
        Ok(forward(hub, move |m: &Message| m.match_id == match_id, on_message))
    }

    /// Call `on_match` for every new match involving `user_id`.
    pub fn subscribe_to_matches<F>(&self, user_id: &str, on_match: F) -> Result<Subscription>
    where
        F: FnMut(Match) + Send + 'static,
    {
        let hub = self
            .store
            .realtime()
            .ok_or_else(|| self.unsupported("subscribe_to_matches"))?;
        let user_id = user_id.to_string();
        Ok(forward(hub, move |m: &Match| m.involves(&user_id), on_match))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::testing::{local, remote};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn scenario_creates_one_match<S: Store>(store: Arc<S>) {
        let engine = MatchService::new(store.clone());

        // u2 likes u1's item i1: one-sided, no match yet
        assert!(engine.record_like("u2", "i1", "u1").await.unwrap().is_none());
        assert!(engine.get_matches("u1").await.unwrap().is_empty());

        // u1 likes u2's item i2: mutual
        let m = engine.record_like("u1", "i2", "u2").await.unwrap().unwrap();
        assert_eq!(m.user_ids, ["u1".to_string(), "u2".to_string()]);
        assert_eq!(m.item_ids, ["i1".to_string(), "i2".to_string()]);
        assert_eq!(m.item_of("u1"), Some("i1"));
        assert!(m.last_message_at.is_none());

        // further likes and evaluations never create a second match
        assert!(engine.record_like("u2", "i3", "u1").await.unwrap().is_none());
        assert!(engine.check_for_match("u1", "u2").await.unwrap().is_none());
        assert!(engine.check_for_match("u2", "u1").await.unwrap().is_none());

        let all: Vec<Match> = store.get_collection().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(engine.get_matches("u2").await.unwrap(), vec![m]);
    }

    #[tokio::test]
    async fn scenario_creates_one_match_local() {
        scenario_creates_one_match(local()).await;
    }

    #[tokio::test]
    async fn scenario_creates_one_match_remote() {
        scenario_creates_one_match(remote()).await;
    }

    async fn duplicate_likes_are_one_fact<S: Store>(store: Arc<S>) {
        let engine = MatchService::new(store.clone());
        engine.record_like("u1", "i2", "u2").await.unwrap();
        engine.record_like("u1", "i2", "u2").await.unwrap();
        engine.record_dislike("u1", "i9").await.unwrap();
        engine.record_dislike("u1", "i9").await.unwrap();

        assert_eq!(store.get_collection::<Like>().await.unwrap().len(), 1);
        assert_eq!(store.get_collection::<Dislike>().await.unwrap().len(), 1);
        assert_eq!(engine.get_likes("u1").await.unwrap().len(), 1);
        assert!(engine.get_likes("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_likes_are_one_fact_local() {
        duplicate_likes_are_one_fact(local()).await;
    }

    #[tokio::test]
    async fn duplicate_likes_are_one_fact_remote() {
        duplicate_likes_are_one_fact(remote()).await;
    }

    #[tokio::test]
    async fn liking_own_item_is_rejected() {
        let engine = MatchService::new(local());
        let err = engine.record_like("u1", "i1", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    async fn racing_evaluations_yield_one_match<S: Store>(store: Arc<S>) {
        let engine = MatchService::new(store.clone());
        let now = Utc::now();
        for (id, from, item, owner) in [("l1", "u1", "i2", "u2"), ("l2", "u2", "i1", "u1")] {
            store
                .append(&Like {
                    id: id.into(),
                    from_user_id: from.into(),
                    to_item_id: item.into(),
                    to_user_id: owner.into(),
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let (a, b) = tokio::join!(
            engine.check_for_match("u1", "u2"),
            engine.check_for_match("u2", "u1")
        );
        let created = [a.unwrap(), b.unwrap()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        assert_eq!(created.len(), 1);
        assert_eq!(store.get_collection::<Match>().await.unwrap().len(), 1);

        // the pair's items are assigned to their owners whichever side won
        let m = &created[0];
        assert_eq!(m.item_of("u1"), Some("i1"));
        assert_eq!(m.item_of("u2"), Some("i2"));
    }

    #[tokio::test]
    async fn racing_evaluations_yield_one_match_local() {
        racing_evaluations_yield_one_match(local()).await;
    }

    #[tokio::test]
    async fn racing_evaluations_yield_one_match_remote() {
        racing_evaluations_yield_one_match(remote()).await;
    }

    #[tokio::test]
    async fn pair_uniqueness_is_enforced_by_the_store() {
        let store = remote();
        let m = Match {
            id: "m1".into(),
            user_ids: ["u1".into(), "u2".into()],
            item_ids: ["i1".into(), "i2".into()],
            created_at: Utc::now(),
            last_message_at: None,
        };
        store.append(&m).await.unwrap();

        let mut mirrored = m.clone();
        mirrored.id = "m2".into();
        mirrored.user_ids.reverse();
        mirrored.item_ids.reverse();
        assert!(!append_once(store.as_ref(), &mirrored).await.unwrap());
    }

    async fn match_with_chat<S: Store>(store: Arc<S>) -> (MatchService<S>, Match) {
        let engine = MatchService::new(store);
        engine.record_like("u2", "i1", "u1").await.unwrap();
        let m = engine.record_like("u1", "i2", "u2").await.unwrap().unwrap();
        (engine, m)
    }

    async fn chat_and_unread_counts<S: Store>(store: Arc<S>) {
        let (engine, m) = match_with_chat(store).await;

        let mut last = None;
        for i in 0..5 {
            let sender = if i % 2 == 0 { "u1" } else { "u2" };
            last = Some(engine.send_message(&m.id, sender, &format!("msg {i}")).await.unwrap());
        }
        let last = last.unwrap();

        // u1 sent 0, 2, 4 and u2 sent 1, 3
        assert_eq!(engine.get_unread_count("u1").await.unwrap(), 2);
        assert_eq!(engine.get_unread_count("u2").await.unwrap(), 3);

        let stored = engine.get_match_by_id(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_at, Some(last.created_at));

        let messages = engine.get_messages(&m.id).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);

        assert_eq!(engine.mark_messages_as_read(&m.id, "u2").await.unwrap(), 3);
        assert_eq!(engine.get_unread_count("u2").await.unwrap(), 0);
        assert_eq!(engine.get_unread_count("u1").await.unwrap(), 2);

        // read state never flips back, and a second pass changes nothing
        assert_eq!(engine.mark_messages_as_read(&m.id, "u2").await.unwrap(), 0);
        engine.send_message(&m.id, "u1", "one more").await.unwrap();
        assert_eq!(engine.get_unread_count("u2").await.unwrap(), 1);
        let read = engine
            .get_messages(&m.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_read)
            .count();
        assert_eq!(read, 3);

        assert_eq!(engine.mark_messages_as_read(&m.id, "u1").await.unwrap(), 2);
        assert_eq!(engine.get_unread_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chat_and_unread_counts_local() {
        chat_and_unread_counts(local()).await;
    }

    #[tokio::test]
    async fn chat_and_unread_counts_remote() {
        chat_and_unread_counts(remote()).await;
    }

    async fn send_message_rules<S: Store>(store: Arc<S>) {
        let (engine, m) = match_with_chat(store).await;

        let empty = engine.send_message(&m.id, "u1", "   ").await.unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::Validation);

        let too_long = "x".repeat(rebox_shared::constants::MAX_MESSAGE_LENGTH + 1);
        let long = engine.send_message(&m.id, "u1", &too_long).await.unwrap_err();
        assert_eq!(long.kind(), ErrorKind::Validation);

        let stranger = engine.send_message(&m.id, "u3", "hi").await.unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Forbidden);

        let missing = engine.send_message("ghost", "u1", "hi").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        assert!(engine.get_messages(&m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_message_rules_local() {
        send_message_rules(local()).await;
    }

    #[tokio::test]
    async fn send_message_rules_remote() {
        send_message_rules(remote()).await;
    }

    #[tokio::test]
    async fn matches_are_ordered_by_activity() {
        let (engine, first) = match_with_chat(local()).await;
        engine.record_like("u3", "i1", "u1").await.unwrap();
        let second = engine.record_like("u1", "i4", "u3").await.unwrap().unwrap();

        let ids: Vec<_> = engine
            .get_matches("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, [second.id.clone(), first.id.clone()]);

        engine.send_message(&first.id, "u2", "still there?").await.unwrap();
        let ids: Vec<_> = engine
            .get_matches("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, [first.id, second.id]);
    }

    #[tokio::test]
    async fn local_backend_has_no_push() {
        let engine = MatchService::new(local());
        let err = engine.subscribe_to_messages("m1", |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = engine.subscribe_to_matches("u1", |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn remote_pushes_matches_and_messages() {
        let engine = MatchService::new(remote());
        let (match_tx, mut match_rx) = mpsc::unbounded_channel();
        let _matches = engine
            .subscribe_to_matches("u1", move |m| {
                let _ = match_tx.send(m);
            })
            .unwrap();

        engine.record_like("u2", "i1", "u1").await.unwrap();
        let m = engine.record_like("u1", "i2", "u2").await.unwrap().unwrap();
        let pushed = tokio::time::timeout(Duration::from_secs(1), match_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed, m);

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let messages = engine
            .subscribe_to_messages(&m.id, move |msg| {
                let _ = msg_tx.send(msg);
            })
            .unwrap();
        let sent = engine.send_message(&m.id, "u2", "hello").await.unwrap();
        let pushed = tokio::time::timeout(Duration::from_secs(1), msg_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed, sent);

        messages.unsubscribe();
        engine.send_message(&m.id, "u2", "anyone?").await.unwrap();
        let after = tokio::time::timeout(Duration::from_millis(200), msg_rx.recv()).await;
        assert!(matches!(after, Err(_) | Ok(None)));
    }
}

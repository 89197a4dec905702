//! Per-user application state.
//!
//! A [`Session`] wraps the three services and caches what a signed-in user
//! looks at: their items, their feed, their matches, open conversations and
//! the unread badge. Writes go through the services first and are merged into
//! the caches afterwards. Records that arrive twice (once from a push and once
//! from a re-fetch) are merged by id, so they never show up twice.

use std::collections::HashMap;
use std::sync::Arc;

use rebox_store::{Item, Match, Message, Store, User};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::identity::IdentityProvider;
use crate::services::{
    AuthService, ItemService, ItemUpdate, LoginCredentials, MatchService, NewItem, ProfileUpdate,
    RegisterData,
};

/// Everything the session caches. Empty when nobody is signed in.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<User>,
    pub user_items: Vec<Item>,
    pub feed: Vec<Item>,
    pub matches: Vec<Match>,
    /// A match just created by the user's own like, waiting to be shown.
    pub pending_match: Option<Match>,
    pub messages: HashMap<String, Vec<Message>>,
    pub unread_count: usize,
}

/// Insert or replace by id. Returns `true` if the record was new.
fn merge_by_id<T>(list: &mut Vec<T>, incoming: T, id: impl Fn(&T) -> &str) -> bool {
    match list.iter().position(|existing| id(existing) == id(&incoming)) {
        Some(idx) => {
            list[idx] = incoming;
            false
        }
        None => {
            list.push(incoming);
            true
        }
    }
}

fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
}

fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Bump the cached match of `message` so it sorts by the new activity.
fn touch_match(matches: &mut [Match], message: &Message) {
    if let Some(m) = matches.iter_mut().find(|m| m.id == message.match_id) {
        if m.last_message_at.map_or(true, |at| at < message.created_at) {
            m.last_message_at = Some(message.created_at);
        }
    }
    sort_matches(matches);
}

pub struct Session<S> {
    store: Arc<S>,
    auth: AuthService<S>,
    items: ItemService<S>,
    matches: MatchService<S>,
    state: RwLock<SessionState>,
}

impl<S: Store> Session<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            auth: AuthService::new(store.clone()),
            items: ItemService::new(store.clone()),
            matches: MatchService::new(store.clone()),
            store,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.auth = self.auth.with_identity_provider(provider);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &AuthService<S> {
        &self.auth
    }

    pub fn items(&self) -> &ItemService<S> {
        &self.items
    }

    pub fn matches(&self) -> &MatchService<S> {
        &self.matches
    }

    pub fn on_auth_state_change(&self) -> watch::Receiver<Option<User>> {
        self.auth.on_auth_state_change()
    }

    // -- Reads -------------------------------------------------------------

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn user_items(&self) -> Vec<Item> {
        self.state.read().await.user_items.clone()
    }

    pub async fn feed(&self) -> Vec<Item> {
        self.state.read().await.feed.clone()
    }

    pub async fn cached_matches(&self) -> Vec<Match> {
        self.state.read().await.matches.clone()
    }

    pub async fn pending_match(&self) -> Option<Match> {
        self.state.read().await.pending_match.clone()
    }

    pub async fn cached_messages(&self, match_id: &str) -> Vec<Message> {
        self.state
            .read()
            .await
            .messages
            .get(match_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.read().await.unread_count
    }

    async fn user_id(&self) -> Result<String> {
        self.state
            .read()
            .await
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or(ServiceError::NotAuthenticated)
    }

    // -- Auth --------------------------------------------------------------

    /// Pick up a user persisted by an earlier run.
    pub async fn restore(&self) -> Result<Option<User>> {
        let user = self.auth.restore().await?;
        self.on_signed_in(user.clone()).await?;
        Ok(user)
    }

    pub async fn register(&self, data: RegisterData) -> Result<User> {
        let user = self.auth.register(data).await?;
        self.on_signed_in(Some(user.clone())).await?;
        Ok(user)
    }

    pub async fn login(&self, credentials: LoginCredentials) -> Result<User> {
        let user = self.auth.login(credentials).await?;
        self.on_signed_in(Some(user.clone())).await?;
        Ok(user)
    }

    pub async fn login_anonymously(&self, name: &str) -> Result<User> {
        let user = self.auth.login_anonymously(name).await?;
        self.on_signed_in(Some(user.clone())).await?;
        Ok(user)
    }

    pub async fn sign_in_with_provider(&self, provider: &str, code: &str) -> Result<User> {
        let user = self.auth.sign_in_with_provider(provider, code).await?;
        self.on_signed_in(Some(user.clone())).await?;
        Ok(user)
    }

    pub async fn logout(&self) -> Result<()> {
        self.auth.logout().await?;
        *self.state.write().await = SessionState::default();
        Ok(())
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User> {
        let user_id = self.user_id().await?;
        let user = self.auth.update_profile(&user_id, update).await?;
        self.state.write().await.user = Some(user.clone());
        Ok(user)
    }

    /// Reset the caches for `user` and, if someone is signed in, load them.
    async fn on_signed_in(&self, user: Option<User>) -> Result<()> {
        *self.state.write().await = SessionState {
            user: user.clone(),
            ..SessionState::default()
        };
        if user.is_some() {
            self.refresh_all().await?;
        }
        Ok(())
    }

    pub async fn refresh_all(&self) -> Result<()> {
        self.refresh_user_items().await?;
        self.refresh_feed().await?;
        self.refresh_matches().await?;
        self.refresh_unread_count().await?;
        Ok(())
    }

    // -- Items -------------------------------------------------------------

    pub async fn refresh_user_items(&self) -> Result<Vec<Item>> {
        let user_id = self.user_id().await?;
        let items = self.items.get_user_items(&user_id).await?;
        self.state.write().await.user_items = items.clone();
        Ok(items)
    }

    pub async fn refresh_feed(&self) -> Result<Vec<Item>> {
        let user_id = self.user_id().await?;
        let feed = self.items.get_feed_items(&user_id).await?;
        self.state.write().await.feed = feed.clone();
        Ok(feed)
    }

    pub async fn add_item(&self, new: NewItem) -> Result<Item> {
        let user_id = self.user_id().await?;
        let item = self.items.create_item(&user_id, new).await?;

        let mut state = self.state.write().await;
        state.user_items.retain(|i| i.id != item.id);
        state.user_items.insert(0, item.clone());
        Ok(item)
    }

    pub async fn update_item(&self, item_id: &str, update: ItemUpdate) -> Result<Option<Item>> {
        let user_id = self.user_id().await?;
        let updated = self.items.update_item(&user_id, item_id, update).await?;

        let mut state = self.state.write().await;
        match &updated {
            Some(item) => {
                merge_by_id(&mut state.user_items, item.clone(), |i| i.id.as_str());
            }
            None => state.user_items.retain(|i| i.id != item_id),
        }
        Ok(updated)
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<bool> {
        let user_id = self.user_id().await?;
        let deleted = self.items.delete_item(&user_id, item_id).await?;
        self.state
            .write()
            .await
            .user_items
            .retain(|i| i.id != item_id);
        Ok(deleted)
    }

    // -- Swiping -----------------------------------------------------------

    /// Like `item`. On a match it becomes the pending match and heads the
    /// cached match list.
    pub async fn like_item(&self, item: &Item) -> Result<Option<Match>> {
        let user_id = self.user_id().await?;
        let new_match = self
            .matches
            .record_like(&user_id, &item.id, &item.user_id)
            .await?;

        let mut state = self.state.write().await;
        state.feed.retain(|i| i.id != item.id);
        if let Some(m) = &new_match {
            state.pending_match = Some(m.clone());
            merge_by_id(&mut state.matches, m.clone(), |m| m.id.as_str());
            sort_matches(&mut state.matches);
        }
        Ok(new_match)
    }

    pub async fn dislike_item(&self, item: &Item) -> Result<()> {
        let user_id = self.user_id().await?;
        self.matches.record_dislike(&user_id, &item.id).await?;
        self.state.write().await.feed.retain(|i| i.id != item.id);
        Ok(())
    }

    pub async fn clear_pending_match(&self) {
        self.state.write().await.pending_match = None;
    }

    // -- Matches & chat ----------------------------------------------------

    pub async fn refresh_matches(&self) -> Result<Vec<Match>> {
        let user_id = self.user_id().await?;
        let matches = self.matches.get_matches(&user_id).await?;
        self.state.write().await.matches = matches.clone();
        Ok(matches)
    }

    pub async fn refresh_unread_count(&self) -> Result<usize> {
        let user_id = self.user_id().await?;
        let count = self.matches.get_unread_count(&user_id).await?;
        self.state.write().await.unread_count = count;
        Ok(count)
    }

    /// Fetch a conversation and merge it into the cache.
    pub async fn load_messages(&self, match_id: &str) -> Result<Vec<Message>> {
        let fetched = self.matches.get_messages(match_id).await?;

        let mut state = self.state.write().await;
        let cached = state.messages.entry(match_id.to_string()).or_default();
        for message in fetched {
            merge_by_id(cached, message, |m| m.id.as_str());
        }
        sort_messages(cached);
        Ok(cached.clone())
    }

    pub async fn send_message(&self, match_id: &str, text: &str) -> Result<Message> {
        let user_id = self.user_id().await?;
        let message = self.matches.send_message(match_id, &user_id, text).await?;

        let mut state = self.state.write().await;
        let cached = state.messages.entry(match_id.to_string()).or_default();
        merge_by_id(cached, message.clone(), |m| m.id.as_str());
        sort_messages(cached);
        touch_match(&mut state.matches, &message);
        Ok(message)
    }

    /// Mark the conversation as read by the signed-in user.
    pub async fn mark_read(&self, match_id: &str) -> Result<usize> {
        let user_id = self.user_id().await?;
        let changed = self.matches.mark_messages_as_read(match_id, &user_id).await?;

        {
            let mut state = self.state.write().await;
            if let Some(cached) = state.messages.get_mut(match_id) {
                cached
                    .iter_mut()
                    .filter(|m| m.sender_id != user_id)
                    .for_each(|m| m.is_read = true);
            }
        }
        self.refresh_unread_count().await?;
        Ok(changed)
    }

    /// Merge a message delivered by a push subscription or a re-fetch.
    ///
    /// Returns `true` if it was not cached yet.
    pub async fn apply_incoming_message(&self, message: Message) -> bool {
        let mut state = self.state.write().await;
        let Some(user_id) = state.user.as_ref().map(|u| u.id.clone()) else {
            return false;
        };

        let counts_as_unread = !message.is_read && message.sender_id != user_id;
        let cached = state.messages.entry(message.match_id.clone()).or_default();
        let is_new = merge_by_id(cached, message.clone(), |m| m.id.as_str());
        sort_messages(cached);
        touch_match(&mut state.matches, &message);

        if is_new && counts_as_unread {
            state.unread_count += 1;
        }
        debug!(message_id = %message.id, is_new, "incoming message merged");
        is_new
    }

    /// Merge a match delivered by a push subscription or a re-fetch.
    ///
    /// Matches not involving the signed-in user are ignored.
    pub async fn apply_incoming_match(&self, incoming: Match) -> bool {
        let mut state = self.state.write().await;
        let involved = state
            .user
            .as_ref()
            .is_some_and(|u| incoming.involves(&u.id));
        if !involved {
            return false;
        }

        let match_id = incoming.id.clone();
        let is_new = merge_by_id(&mut state.matches, incoming, |m| m.id.as_str());
        sort_matches(&mut state.matches);
        debug!(%match_id, is_new, "incoming match merged");
        is_new
    }
}

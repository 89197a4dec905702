//! The persistence contract shared by both backends.

use std::future::Future;

use rebox_shared::Backend;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::Like;
use crate::query::{Filter, Patch};
use crate::realtime::RealtimeHub;
use crate::record::Record;

/// Result of the mutual-like check for an ordered pair `(a, b)`.
///
/// `item_a_id` is the item of `a` that `b` liked, `item_b_id` the item of
/// `b` that `a` liked. Each is the earliest such like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutualLikes {
    pub has_mutual_likes: bool,
    pub item_a_id: Option<String>,
    pub item_b_id: Option<String>,
}

impl MutualLikes {
    pub fn from_items(item_a_id: Option<String>, item_b_id: Option<String>) -> Self {
        Self {
            has_mutual_likes: item_a_id.is_some() && item_b_id.is_some(),
            item_a_id,
            item_b_id,
        }
    }
}

/// Earliest like by `created_at`, ties broken by insertion order.
pub fn earliest_like(likes: &[Like]) -> Option<&Like> {
    likes.iter().min_by_key(|l| l.created_at)
}

/// CRUD and query primitives over named record collections plus a few raw
/// singleton keys.
///
/// Missing records are reported differently by the two backends:
/// [`Store::update_where`] and [`Store::remove_where`] are silent no-ops on
/// the local store and `StoreError::NotFound` on the relational store.
pub trait Store: Send + Sync + 'static {
    fn backend(&self) -> Backend;

    /// Read a singleton value.
    fn get<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>>> + Send
    where
        T: DeserializeOwned + Send;

    /// Write a singleton value.
    fn set<T>(&self, key: &str, value: &T) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync;

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Every record of the collection, in insertion order.
    fn get_collection<R: Record>(&self) -> impl Future<Output = Result<Vec<R>>> + Send;

    /// Insert one record. A uniqueness violation is `StoreError::Conflict`.
    fn append<R: Record>(&self, record: &R) -> impl Future<Output = Result<()>> + Send;

    fn update_where<R: Record>(
        &self,
        id: &str,
        patch: Patch,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Apply `patch` to every matching record. Returns how many changed.
    fn update_many<R: Record>(
        &self,
        filter: &Filter,
        patch: Patch,
    ) -> impl Future<Output = Result<usize>> + Send;

    fn remove_where<R: Record>(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Delete every matching record. Returns how many were removed.
    fn remove_many<R: Record>(&self, filter: &Filter)
        -> impl Future<Output = Result<usize>> + Send;

    fn find_one<R: Record>(&self, id: &str) -> impl Future<Output = Result<Option<R>>> + Send;

    /// Matching records in insertion order.
    fn find_where<R: Record>(&self, filter: &Filter)
        -> impl Future<Output = Result<Vec<R>>> + Send;

    fn count_where<R: Record>(&self, filter: &Filter) -> impl Future<Output = Result<usize>> + Send {
        async move { Ok(self.find_where::<R>(filter).await?.len()) }
    }

    /// Has `user_a` liked an item of `user_b` and the other way around?
    fn mutual_likes(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> impl Future<Output = Result<MutualLikes>> + Send {
        async move {
            let b_liked_a: Vec<Like> = self
                .find_where(&Filter::new().eq("fromUserId", user_b).eq("toUserId", user_a))
                .await?;
            let a_liked_b: Vec<Like> = self
                .find_where(&Filter::new().eq("fromUserId", user_a).eq("toUserId", user_b))
                .await?;

            Ok(MutualLikes::from_items(
                earliest_like(&b_liked_a).map(|l| l.to_item_id.clone()),
                earliest_like(&a_liked_b).map(|l| l.to_item_id.clone()),
            ))
        }
    }

    /// Insert notifications, when the backend pushes them.
    fn realtime(&self) -> Option<&RealtimeHub> {
        None
    }
}

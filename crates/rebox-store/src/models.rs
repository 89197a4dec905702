//! Domain records persisted by both storage backends.
//!
//! Field names serialize in camelCase, which is the canonical shape handed to
//! callers and kept in the local JSON arrays. The relational backend maps the
//! same fields onto snake_case columns (see [`crate::record`]).

use chrono::{DateTime, Utc};
use rebox_shared::{ItemCategory, UserPair};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile as seen by the rest of the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// `None` for anonymous users.
    pub email: Option<String>,
    pub name: String,
    pub photo_url: Option<String>,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user row as persisted in the `users` collection.
///
/// The password hash never leaves the auth service; everything else only
/// sees [`User`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

impl StoredUser {
    pub fn into_user(self) -> User {
        self.user
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Something a user offers for exchange. Owned by `user_id` for its whole
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub category: ItemCategory,
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Like / Dislike
// ---------------------------------------------------------------------------

/// `from_user_id` liked `to_item_id`, which belonged to `to_user_id` at the
/// time of the like.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub from_user_id: String,
    pub to_item_id: String,
    pub to_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dislike {
    pub id: String,
    pub from_user_id: String,
    pub to_item_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Two users who liked an item of each other.
///
/// `item_ids[i]` is owned by `user_ids[i]`: `item_ids[0]` is the item of the
/// first user that the second user liked, and the other way around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub user_ids: [String; 2],
    pub item_ids: [String; 2],
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn pair(&self) -> UserPair {
        UserPair::new(&self.user_ids[0], &self.user_ids[1])
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_ids.iter().any(|u| u == user_id)
    }

    /// The participant that is not `user_id`.
    pub fn other_user(&self, user_id: &str) -> Option<&str> {
        match self.user_ids.iter().position(|u| u == user_id) {
            Some(0) => Some(&self.user_ids[1]),
            Some(_) => Some(&self.user_ids[0]),
            None => None,
        }
    }

    /// The item owned by `user_id` in this match.
    pub fn item_of(&self, user_id: &str) -> Option<&str> {
        self.user_ids
            .iter()
            .position(|u| u == user_id)
            .map(|i| self.item_ids[i].as_str())
    }

    /// Sort key for match lists: last message, else creation.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message inside a match. Only `is_read` ever changes, and only
/// from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

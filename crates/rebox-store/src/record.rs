//! The [`Record`] trait ties a model to its collection name, its uniqueness
//! rule and its relational column layout.
//!
//! Both backends are generic over `Record`: the local store only needs the
//! serde shape plus [`Record::id`] / [`Record::unique_key`], while the
//! relational store also uses [`Record::FIELDS`], [`Record::to_sql`] and
//! [`Record::from_row`].

use chrono::{DateTime, SecondsFormat, Utc};
use rebox_shared::constants::*;
use rebox_shared::ItemCategory;
use rusqlite::types::{Type, Value as SqlValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Dislike, Item, Like, Match, Message, StoredUser, User};

/// How a field's values are encoded in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// RFC 3339 text with a fixed nanosecond width so it sorts lexically.
    Timestamp,
    /// INTEGER 0/1.
    Bool,
}

/// A camelCase field and the snake_case column(s) that hold it.
///
/// Array fields such as `Match::user_ids` span two columns.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub kind: FieldKind,
}

const fn mapped(name: &'static str, columns: &'static [&'static str], kind: FieldKind) -> Field {
    Field {
        name,
        columns,
        kind,
    }
}

/// A persisted record type.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (local) and table (relational) name.
    const COLLECTION: &'static str;

    /// Field layout. The first field is always `id`.
    const FIELDS: &'static [Field];

    fn id(&self) -> &str;

    /// Key that must be unique within the collection, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Values for every column of [`Record::FIELDS`], in order.
    fn to_sql(&self) -> Vec<SqlValue>;

    /// Rebuild a record from a row selected with [`Record::columns`].
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;

    fn columns() -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .flat_map(|f| f.columns.iter().copied())
            .collect()
    }

    fn field(name: &str) -> Option<&'static Field> {
        Self::FIELDS.iter().find(|f| f.name == name)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

impl Record for StoredUser {
    const COLLECTION: &'static str = USERS_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("email", &["email"], FieldKind::Text),
        mapped("name", &["name"], FieldKind::Text),
        mapped("photoUrl", &["photo_url"], FieldKind::Text),
        mapped("isAnonymous", &["is_anonymous"], FieldKind::Bool),
        mapped("passwordHash", &["password_hash"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
        mapped("updatedAt", &["updated_at"], FieldKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.user.id
    }

    fn unique_key(&self) -> Option<String> {
        self.user.email.as_ref().map(|e| format!("email:{e}"))
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        let u = &self.user;
        vec![
            text(&u.id),
            opt_text(u.email.as_deref()),
            text(&u.name),
            opt_text(u.photo_url.as_deref()),
            boolean(u.is_anonymous),
            opt_text(self.password_hash.as_deref()),
            timestamp(&u.created_at),
            timestamp(&u.updated_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredUser {
            user: User {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                photo_url: row.get(3)?,
                is_anonymous: row.get(4)?,
                created_at: get_timestamp(row, 6)?,
                updated_at: get_timestamp(row, 7)?,
            },
            password_hash: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

impl Record for Item {
    const COLLECTION: &'static str = ITEMS_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("userId", &["user_id"], FieldKind::Text),
        mapped("title", &["title"], FieldKind::Text),
        mapped("description", &["description"], FieldKind::Text),
        mapped("category", &["category"], FieldKind::Text),
        mapped("photoUrl", &["photo_url"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
        mapped("updatedAt", &["updated_at"], FieldKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        vec![
            text(&self.id),
            text(&self.user_id),
            text(&self.title),
            text(&self.description),
            text(self.category.as_str()),
            text(&self.photo_url),
            timestamp(&self.created_at),
            timestamp(&self.updated_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let category: String = row.get(4)?;
        let category = category
            .parse::<ItemCategory>()
            .map_err(|e| conversion_error(4, e))?;
        Ok(Item {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category,
            photo_url: row.get(5)?,
            created_at: get_timestamp(row, 6)?,
            updated_at: get_timestamp(row, 7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Likes / dislikes
// ---------------------------------------------------------------------------

impl Record for Like {
    const COLLECTION: &'static str = LIKES_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("fromUserId", &["from_user_id"], FieldKind::Text),
        mapped("toItemId", &["to_item_id"], FieldKind::Text),
        mapped("toUserId", &["to_user_id"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.from_user_id, self.to_item_id))
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        vec![
            text(&self.id),
            text(&self.from_user_id),
            text(&self.to_item_id),
            text(&self.to_user_id),
            timestamp(&self.created_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Like {
            id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_item_id: row.get(2)?,
            to_user_id: row.get(3)?,
            created_at: get_timestamp(row, 4)?,
        })
    }
}

impl Record for Dislike {
    const COLLECTION: &'static str = DISLIKES_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("fromUserId", &["from_user_id"], FieldKind::Text),
        mapped("toItemId", &["to_item_id"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.from_user_id, self.to_item_id))
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        vec![
            text(&self.id),
            text(&self.from_user_id),
            text(&self.to_item_id),
            timestamp(&self.created_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Dislike {
            id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_item_id: row.get(2)?,
            created_at: get_timestamp(row, 3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

impl Record for Match {
    const COLLECTION: &'static str = MATCHES_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("userIds", &["user_a_id", "user_b_id"], FieldKind::Text),
        mapped("itemIds", &["item_a_id", "item_b_id"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
        mapped("lastMessageAt", &["last_message_at"], FieldKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.pair().key())
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        vec![
            text(&self.id),
            text(&self.user_ids[0]),
            text(&self.user_ids[1]),
            text(&self.item_ids[0]),
            text(&self.item_ids[1]),
            timestamp(&self.created_at),
            self.last_message_at
                .as_ref()
                .map(timestamp)
                .unwrap_or(SqlValue::Null),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Match {
            id: row.get(0)?,
            user_ids: [row.get(1)?, row.get(2)?],
            item_ids: [row.get(3)?, row.get(4)?],
            created_at: get_timestamp(row, 5)?,
            last_message_at: get_opt_timestamp(row, 6)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

impl Record for Message {
    const COLLECTION: &'static str = MESSAGES_COLLECTION;
    const FIELDS: &'static [Field] = &[
        mapped("id", &["id"], FieldKind::Text),
        mapped("matchId", &["match_id"], FieldKind::Text),
        mapped("senderId", &["sender_id"], FieldKind::Text),
        mapped("text", &["text"], FieldKind::Text),
        mapped("createdAt", &["created_at"], FieldKind::Timestamp),
        mapped("isRead", &["is_read"], FieldKind::Bool),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_sql(&self) -> Vec<SqlValue> {
        vec![
            text(&self.id),
            text(&self.match_id),
            text(&self.sender_id),
            text(&self.text),
            timestamp(&self.created_at),
            boolean(self.is_read),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Message {
            id: row.get(0)?,
            match_id: row.get(1)?,
            sender_id: row.get(2)?,
            text: row.get(3)?,
            created_at: get_timestamp(row, 4)?,
            is_read: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> SqlValue {
    s.map(text).unwrap_or(SqlValue::Null)
}

fn boolean(b: bool) -> SqlValue {
    SqlValue::Integer(i64::from(b))
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn timestamp(dt: &DateTime<Utc>) -> SqlValue {
    SqlValue::Text(format_timestamp(dt))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(idx, &s)
}

fn get_opt_timestamp(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_timestamp(idx, &s)).transpose()
}

//! Local-only backend: every collection is a JSON array held under its name,
//! next to a handful of singleton keys, optionally mirrored to one JSON file.
//!
//! All operations are read-modify-write on the in-process map. Two processes
//! sharing the same file will overwrite each other (last write wins).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rebox_shared::Backend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::query::{Filter, Patch};
use crate::record::Record;
use crate::store::Store;

type Entries = HashMap<String, Value>;

/// JSON-array store, in memory or backed by a file.
#[derive(Debug)]
pub struct LocalStore {
    entries: Mutex<Entries>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open (or create) a store persisted at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let entries: Entries = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), keys = entries.len(), "opened local store");

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drop every key and collection.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await
    }

    /// Write the whole map to disk via a temporary file and a rename.
    async fn persist(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(entries)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn array<'a>(entries: &'a Entries, collection: &str) -> &'a [Value] {
    entries
        .get(collection)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn array_mut<'a>(entries: &'a mut Entries, collection: &str) -> &'a mut Vec<Value> {
    let slot = entries
        .entry(collection.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

fn has_id(value: &Value, id: &str) -> bool {
    value.get("id").and_then(Value::as_str) == Some(id)
}

fn decode<R: Record>(values: &[Value]) -> Result<Vec<R>> {
    values
        .iter()
        .map(|v| serde_json::from_value(v.clone()).map_err(StoreError::from))
        .collect()
}

/// Apply `patch` and make sure the result still decodes as `R`.
fn patched<R: Record>(value: &Value, patch: &Patch) -> Result<Value> {
    let mut updated = value.clone();
    patch.apply_to(&mut updated);
    serde_json::from_value::<R>(updated.clone())?;
    Ok(updated)
}

/// Swap patched values into `items` only if no two records of the resulting
/// collection share a unique key. On error `items` is left untouched.
fn commit_updates<R: Record>(items: &mut Vec<Value>, updates: Vec<(usize, Value)>) -> Result<()> {
    let mut next = items.clone();
    let mut touched = Vec::with_capacity(updates.len());
    for (index, value) in updates {
        next[index] = value;
        touched.push(index);
    }

    let records: Vec<R> = decode(&next)?;
    for index in touched {
        let Some(key) = records[index].unique_key() else {
            continue;
        };
        let clash = records
            .iter()
            .enumerate()
            .any(|(i, other)| i != index && other.unique_key().as_ref() == Some(&key));
        if clash {
            return Err(StoreError::Conflict {
                collection: R::COLLECTION,
            });
        }
    }

    *items = next;
    Ok(())
}

impl Store for LocalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn get_collection<R: Record>(&self) -> Result<Vec<R>> {
        let entries = self.entries.lock().await;
        decode(array(&entries, R::COLLECTION))
    }

    async fn append<R: Record>(&self, record: &R) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let mut entries = self.entries.lock().await;

        let existing: Vec<R> = decode(array(&entries, R::COLLECTION))?;
        let key = record.unique_key();
        let duplicate = existing.iter().any(|other| {
            other.id() == record.id() || (key.is_some() && other.unique_key() == key)
        });
        if duplicate {
            return Err(StoreError::Conflict {
                collection: R::COLLECTION,
            });
        }

        array_mut(&mut entries, R::COLLECTION).push(value);
        self.persist(&entries).await
    }

    async fn update_where<R: Record>(&self, id: &str, patch: Patch) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let items = array_mut(&mut entries, R::COLLECTION);

        let Some(index) = items.iter().position(|v| has_id(v, id)) else {
            tracing::debug!(collection = R::COLLECTION, id, "update of missing record ignored");
            return Ok(());
        };
        let updated = patched::<R>(&items[index], &patch)?;
        commit_updates::<R>(items, vec![(index, updated)])?;

        self.persist(&entries).await
    }

    async fn update_many<R: Record>(&self, filter: &Filter, patch: Patch) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let items = array_mut(&mut entries, R::COLLECTION);

        let updates = items
            .iter()
            .enumerate()
            .filter(|(_, v)| filter.matches(v))
            .map(|(i, v)| Ok((i, patched::<R>(v, &patch)?)))
            .collect::<Result<Vec<_>>>()?;
        let changed = updates.len();

        if changed > 0 {
            commit_updates::<R>(items, updates)?;
            self.persist(&entries).await?;
        }
        Ok(changed)
    }

    async fn remove_where<R: Record>(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let items = array_mut(&mut entries, R::COLLECTION);
        let before = items.len();
        items.retain(|v| !has_id(v, id));
        if items.len() == before {
            return Ok(());
        }
        self.persist(&entries).await
    }

    async fn remove_many<R: Record>(&self, filter: &Filter) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let items = array_mut(&mut entries, R::COLLECTION);
        let before = items.len();
        items.retain(|v| !filter.matches(v));
        let removed = before - items.len();
        if removed > 0 {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn find_one<R: Record>(&self, id: &str) -> Result<Option<R>> {
        let entries = self.entries.lock().await;
        array(&entries, R::COLLECTION)
            .iter()
            .find(|v| has_id(v, id))
            .map(|v| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .transpose()
    }

    async fn find_where<R: Record>(&self, filter: &Filter) -> Result<Vec<R>> {
        let entries = self.entries.lock().await;
        let matching: Vec<Value> = array(&entries, R::COLLECTION)
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        decode(&matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, Like, Message, StoredUser, User};
    use chrono::Utc;
    use rebox_shared::ItemCategory;

    fn item(id: &str, owner: &str) -> Item {
        let now = Utc::now();
        Item {
            id: id.into(),
            user_id: owner.into(),
            title: format!("Item {id}"),
            description: String::new(),
            category: ItemCategory::Books,
            photo_url: "file:///photo.jpg".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn like(id: &str, from: &str, item: &str, owner: &str) -> Like {
        Like {
            id: id.into(),
            from_user_id: from.into(),
            to_item_id: item.into(),
            to_user_id: owner.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn singleton_keys() {
        let store = LocalStore::in_memory();
        assert_eq!(store.get::<String>("current_user").await.unwrap(), None);

        store.set("current_user", &"u1".to_string()).await.unwrap();
        assert_eq!(
            store.get::<String>("current_user").await.unwrap(),
            Some("u1".to_string())
        );

        store.remove("current_user").await.unwrap();
        assert_eq!(store.get::<String>("current_user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn append_keeps_insertion_order() {
        let store = LocalStore::in_memory();
        for id in ["i1", "i2", "i3"] {
            store.append(&item(id, "u1")).await.unwrap();
        }
        let items: Vec<Item> = store.get_collection().await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["i1", "i2", "i3"]);
    }

    #[tokio::test]
    async fn duplicate_like_is_a_conflict() {
        let store = LocalStore::in_memory();
        store.append(&like("l1", "u1", "i1", "u2")).await.unwrap();

        let err = store.append(&like("l2", "u1", "i1", "u2")).await.unwrap_err();
        assert!(err.is_conflict());

        let same_id = store.append(&like("l1", "u3", "i9", "u2")).await.unwrap_err();
        assert!(same_id.is_conflict());

        let likes: Vec<Like> = store.get_collection().await.unwrap();
        assert_eq!(likes.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_record_is_a_no_op() {
        let store = LocalStore::in_memory();
        store
            .update_where::<Item>("nope", Patch::new().set("title", "x"))
            .await
            .unwrap();
        store.remove_where::<Item>("nope").await.unwrap();
    }

    #[tokio::test]
    async fn update_merges_and_validates() {
        let store = LocalStore::in_memory();
        store.append(&item("i1", "u1")).await.unwrap();

        store
            .update_where::<Item>("i1", Patch::new().set("title", "Renamed"))
            .await
            .unwrap();
        let found: Item = store.find_one("i1").await.unwrap().unwrap();
        assert_eq!(found.title, "Renamed");

        let bad = store
            .update_where::<Item>("i1", Patch::new().set("category", "vehicles"))
            .await;
        assert!(matches!(bad, Err(StoreError::Json(_))));
        let found: Item = store.find_one("i1").await.unwrap().unwrap();
        assert_eq!(found.category, ItemCategory::Books);
    }

    #[tokio::test]
    async fn update_into_taken_email_is_a_conflict() {
        let store = LocalStore::in_memory();
        let now = Utc::now();
        let user = |id: &str, email: Option<&str>| StoredUser {
            user: User {
                id: id.into(),
                email: email.map(Into::into),
                name: id.into(),
                photo_url: None,
                is_anonymous: false,
                created_at: now,
                updated_at: now,
            },
            password_hash: None,
        };
        store.append(&user("u1", Some("ana@example.com"))).await.unwrap();
        store.append(&user("u2", None)).await.unwrap();

        let err = store
            .update_where::<StoredUser>("u2", Patch::new().set("email", "ana@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let u2: StoredUser = store.find_one("u2").await.unwrap().unwrap();
        assert_eq!(u2.user.email, None);

        // re-saving a record with its own key is fine
        store
            .update_where::<StoredUser>("u1", Patch::new().set("email", "ana@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_bulk_update_changes_nothing() {
        let store = LocalStore::in_memory();
        store.append(&like("l1", "u1", "i1", "u2")).await.unwrap();
        store.append(&like("l2", "u1", "i2", "u2")).await.unwrap();

        let err = store
            .update_many::<Like>(
                &Filter::new().eq("fromUserId", "u1"),
                Patch::new().set("toItemId", "i3"),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let likes: Vec<Like> = store.get_collection().await.unwrap();
        let items: Vec<_> = likes.iter().map(|l| l.to_item_id.as_str()).collect();
        assert_eq!(items, ["i1", "i2"]);
    }

    #[tokio::test]
    async fn bulk_update_and_remove() {
        let store = LocalStore::in_memory();
        for (id, sender) in [("x1", "u1"), ("x2", "u2"), ("x3", "u2")] {
            store
                .append(&Message {
                    id: id.into(),
                    match_id: "m1".into(),
                    sender_id: sender.into(),
                    text: "hi".into(),
                    created_at: Utc::now(),
                    is_read: false,
                })
                .await
                .unwrap();
        }

        let unread = Filter::new()
            .eq("matchId", "m1")
            .ne("senderId", "u1")
            .eq("isRead", false);
        let changed = store
            .update_many::<Message>(&unread, Patch::new().set("isRead", true))
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(store.count_where::<Message>(&unread).await.unwrap(), 0);

        let removed = store
            .remove_many::<Message>(&Filter::new().eq("senderId", "u2"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get_collection::<Message>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mutual_likes_client_side() {
        let store = LocalStore::in_memory();
        store.append(&like("l1", "u1", "i1", "u2")).await.unwrap();

        let one_sided = store.mutual_likes("u1", "u2").await.unwrap();
        assert!(!one_sided.has_mutual_likes);

        store.append(&like("l2", "u2", "i2", "u1")).await.unwrap();
        store.append(&like("l3", "u2", "i3", "u1")).await.unwrap();

        let mutual = store.mutual_likes("u1", "u2").await.unwrap();
        assert!(mutual.has_mutual_likes);
        assert_eq!(mutual.item_a_id.as_deref(), Some("i2"));
        assert_eq!(mutual.item_b_id.as_deref(), Some("i1"));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rebox.json");

        {
            let store = LocalStore::open(&path).await.unwrap();
            store.append(&item("i1", "u1")).await.unwrap();
            store.set("current_user", &"u1").await.unwrap();
        }

        let reopened = LocalStore::open(&path).await.unwrap();
        let items: Vec<Item> = reopened.get_collection().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "i1");
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(
            reopened.get::<String>("current_user").await.unwrap().as_deref(),
            Some("u1")
        );

        reopened.clear().await.unwrap();
        assert!(reopened.get_collection::<Item>().await.unwrap().is_empty());
    }
}

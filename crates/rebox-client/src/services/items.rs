use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rebox_shared::validation::{validate_item_description, validate_item_title, validate_photo_url};
use rebox_shared::{generate_id, ItemCategory};
use rebox_store::{Dislike, Filter, Item, Like, Patch, Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{timestamp_value, tolerate_missing};
use crate::error::{Result, ServiceError};

/// Input for [`ItemService::create_item`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: ItemCategory,
    pub photo_url: String,
}

/// Partial item update. The owner and creation time are not editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ItemCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ItemUpdate {
    fn trimmed(self) -> Self {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
        Self {
            title: trim(self.title),
            description: trim(self.description),
            category: self.category,
            photo_url: trim(self.photo_url),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_item_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_item_description(description)?;
        }
        if let Some(photo) = &self.photo_url {
            validate_photo_url(photo)?;
        }
        Ok(())
    }

    fn apply(self, item: &mut Item) {
        if let Some(title) = self.title {
            item.title = title;
        }
        if let Some(description) = self.description {
            item.description = description;
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(photo) = self.photo_url {
            item.photo_url = photo;
        }
    }
}

/// Newest-created first. Stable, so equal timestamps keep insertion order.
fn newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub struct ItemService<S> {
    store: Arc<S>,
}

impl<S: Store> ItemService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_item(&self, user_id: &str, new: NewItem) -> Result<Item> {
        validate_item_title(&new.title)?;
        validate_item_description(&new.description)?;
        validate_photo_url(&new.photo_url)?;

        let now = Utc::now();
        let item = Item {
            id: generate_id(),
            user_id: user_id.to_string(),
            title: new.title.trim().to_string(),
            description: new.description.trim().to_string(),
            category: new.category,
            photo_url: new.photo_url.trim().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.append(&item).await?;

        info!(item_id = %item.id, user_id, category = %item.category, "item created");
        Ok(item)
    }

    pub async fn get_user_items(&self, user_id: &str) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .store
            .find_where(&Filter::new().eq("userId", user_id))
            .await?;
        newest_first(&mut items);
        Ok(items)
    }

    /// Items of other users that `user_id` has neither liked nor disliked.
    ///
    /// Recomputed from scratch on every call.
    pub async fn get_feed_items(&self, user_id: &str) -> Result<Vec<Item>> {
        let candidates: Vec<Item> = self
            .store
            .find_where(&Filter::new().ne("userId", user_id))
            .await?;
        let likes: Vec<Like> = self
            .store
            .find_where(&Filter::new().eq("fromUserId", user_id))
            .await?;
        let dislikes: Vec<Dislike> = self
            .store
            .find_where(&Filter::new().eq("fromUserId", user_id))
            .await?;

        let seen: HashSet<&str> = likes
            .iter()
            .map(|l| l.to_item_id.as_str())
            .chain(dislikes.iter().map(|d| d.to_item_id.as_str()))
            .collect();

        let mut feed: Vec<Item> = candidates
            .into_iter()
            .filter(|item| !seen.contains(item.id.as_str()))
            .collect();
        newest_first(&mut feed);

        debug!(user_id, feed = feed.len(), excluded = seen.len(), "feed computed");
        Ok(feed)
    }

    pub async fn get_item_by_id(&self, item_id: &str) -> Result<Option<Item>> {
        Ok(self.store.find_one(item_id).await?)
    }

    /// Items with the given ids, in store order. Unknown ids are skipped.
    pub async fn get_items_by_ids(&self, item_ids: &[String]) -> Result<Vec<Item>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .find_where(&Filter::new().is_in("id", item_ids.iter().cloned()))
            .await?)
    }

    pub async fn get_all_items(&self) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self.store.get_collection().await?;
        newest_first(&mut items);
        Ok(items)
    }

    async fn owned_item(&self, actor_id: &str, item_id: &str) -> Result<Option<Item>> {
        let Some(item) = self.get_item_by_id(item_id).await? else {
            tracing::warn!(item_id, "item not found");
            return Ok(None);
        };
        if item.user_id != actor_id {
            return Err(ServiceError::Forbidden(
                "Only the owner can change this item".into(),
            ));
        }
        Ok(Some(item))
    }

    /// Apply `update` and refresh `updatedAt`. Returns the updated item, or
    /// `None` when it no longer exists.
    pub async fn update_item(
        &self,
        actor_id: &str,
        item_id: &str,
        update: ItemUpdate,
    ) -> Result<Option<Item>> {
        let update = update.trimmed();
        update.validate()?;
        let Some(mut item) = self.owned_item(actor_id, item_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let patch = Patch::from_serialize(&update)
            .map_err(StoreError::from)?
            .set("updatedAt", timestamp_value(&now));
        let result = self.store.update_where::<Item>(item_id, patch).await;
        tolerate_missing(result, "items", item_id)?;

        update.apply(&mut item);
        item.updated_at = now;
        Ok(Some(item))
    }

    /// Delete an item together with the likes and dislikes pointing at it.
    /// Matches and messages referring to it are kept.
    pub async fn delete_item(&self, actor_id: &str, item_id: &str) -> Result<bool> {
        if self.owned_item(actor_id, item_id).await?.is_none() {
            return Ok(false);
        }

        let result = self.store.remove_where::<Item>(item_id).await;
        tolerate_missing(result, "items", item_id)?;

        let targeting = Filter::new().eq("toItemId", item_id);
        let likes = self.store.remove_many::<Like>(&targeting).await?;
        let dislikes = self.store.remove_many::<Dislike>(&targeting).await?;

        info!(item_id, likes, dislikes, "item deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::testing::{local, remote};
    use chrono::Duration;

    fn new_item(title: &str, category: ItemCategory) -> NewItem {
        NewItem {
            title: title.into(),
            description: "Good condition".into(),
            category,
            photo_url: "https://example.com/photo.jpg".into(),
        }
    }

    fn like(from: &str, item: &Item) -> Like {
        Like {
            id: generate_id(),
            from_user_id: from.into(),
            to_item_id: item.id.clone(),
            to_user_id: item.user_id.clone(),
            created_at: Utc::now(),
        }
    }

    fn dislike(from: &str, item: &Item) -> Dislike {
        Dislike {
            id: generate_id(),
            from_user_id: from.into(),
            to_item_id: item.id.clone(),
            created_at: Utc::now(),
        }
    }

    async fn create_and_list<S: Store>(store: Arc<S>) {
        let items = ItemService::new(store.clone());
        let older = Item {
            id: "old".into(),
            user_id: "u1".into(),
            title: "Old".into(),
            description: String::new(),
            category: ItemCategory::Books,
            photo_url: "p".into(),
            created_at: Utc::now() - Duration::days(3),
            updated_at: Utc::now() - Duration::days(3),
        };
        store.append(&older).await.unwrap();

        let bike = items
            .create_item("u1", new_item("  Bike ", ItemCategory::Sports))
            .await
            .unwrap();
        assert_eq!(bike.title, "Bike");
        assert_eq!(bike.created_at, bike.updated_at);
        items
            .create_item("u2", new_item("Lamp", ItemCategory::Home))
            .await
            .unwrap();

        let mine = items.get_user_items("u1").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, [bike.id.as_str(), "old"]);

        assert_eq!(items.get_all_items().await.unwrap().len(), 3);
        assert_eq!(items.get_item_by_id(&bike.id).await.unwrap(), Some(bike.clone()));

        let by_ids = items
            .get_items_by_ids(&["old".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(by_ids.len(), 1);
        assert!(items.get_items_by_ids(&[]).await.unwrap().is_empty());

        let invalid = items
            .create_item("u1", new_item("   ", ItemCategory::Other))
            .await
            .unwrap_err();
        assert_eq!(invalid.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn create_and_list_local() {
        create_and_list(local()).await;
    }

    #[tokio::test]
    async fn create_and_list_remote() {
        create_and_list(remote()).await;
    }

    async fn feed_excludes_own_liked_and_disliked<S: Store>(store: Arc<S>) {
        let items = ItemService::new(store.clone());
        let own = items.create_item("u1", new_item("Mine", ItemCategory::Toys)).await.unwrap();
        let liked = items.create_item("u2", new_item("Liked", ItemCategory::Toys)).await.unwrap();
        let disliked = items
            .create_item("u2", new_item("Disliked", ItemCategory::Toys))
            .await
            .unwrap();
        let fresh = items.create_item("u3", new_item("Fresh", ItemCategory::Toys)).await.unwrap();

        store.append(&like("u1", &liked)).await.unwrap();
        store.append(&dislike("u1", &disliked)).await.unwrap();
        // other users' interactions do not hide anything from u1
        store.append(&dislike("u2", &fresh)).await.unwrap();

        let feed = items.get_feed_items("u1").await.unwrap();
        let ids: Vec<_> = feed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, [fresh.id.as_str()]);
        assert!(!ids.contains(&own.id.as_str()));

        let feed_u2 = items.get_feed_items("u2").await.unwrap();
        assert_eq!(feed_u2.len(), 1);
        assert_eq!(feed_u2[0].id, own.id);
    }

    #[tokio::test]
    async fn feed_excludes_own_liked_and_disliked_local() {
        feed_excludes_own_liked_and_disliked(local()).await;
    }

    #[tokio::test]
    async fn feed_excludes_own_liked_and_disliked_remote() {
        feed_excludes_own_liked_and_disliked(remote()).await;
    }

    async fn update_and_delete<S: Store>(store: Arc<S>) {
        let items = ItemService::new(store.clone());
        let item = items
            .create_item("u1", new_item("Chair", ItemCategory::Furniture))
            .await
            .unwrap();

        let forbidden = items
            .update_item("u2", &item.id, ItemUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        let updated = items
            .update_item(
                "u1",
                &item.id,
                ItemUpdate {
                    title: Some("  Armchair ".into()),
                    description: Some("Comfy\n".into()),
                    ..ItemUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Armchair");
        assert_eq!(updated.description, "Comfy");
        assert!(updated.updated_at >= item.updated_at);
        let stored = items.get_item_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);

        // missing ids are tolerated
        assert!(items
            .update_item("u1", "ghost", ItemUpdate::default())
            .await
            .unwrap()
            .is_none());
        assert!(!items.delete_item("u1", "ghost").await.unwrap());

        store.append(&like("u2", &item)).await.unwrap();
        store.append(&dislike("u3", &item)).await.unwrap();

        let forbidden = items.delete_item("u2", &item.id).await.unwrap_err();
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        assert!(items.delete_item("u1", &item.id).await.unwrap());
        assert!(items.get_item_by_id(&item.id).await.unwrap().is_none());
        assert!(store.get_collection::<Like>().await.unwrap().is_empty());
        assert!(store.get_collection::<Dislike>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_local() {
        update_and_delete(local()).await;
    }

    #[tokio::test]
    async fn update_and_delete_remote() {
        update_and_delete(remote()).await;
    }
}

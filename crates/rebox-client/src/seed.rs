//! Demo data for an empty store: four users and a dozen items.

use chrono::{Duration, Utc};
use rand::Rng;
use rebox_shared::crypto::hash_password;
use rebox_shared::{generate_id, ItemCategory};
use rebox_store::{Filter, Item, Store, StoredUser, User};
use tracing::info;

use crate::error::Result;

/// Password shared by every demo account.
pub const DEMO_PASSWORD: &str = "demo123";

struct DemoUser {
    email: &'static str,
    name: &'static str,
    photo_url: &'static str,
}

struct DemoItem {
    title: &'static str,
    description: &'static str,
    category: ItemCategory,
    photo_url: &'static str,
}

const DEMO_USERS: [DemoUser; 4] = [
    DemoUser {
        email: "maria@demo.com",
        name: "Maria Silva",
        photo_url: "https://images.unsplash.com/photo-1494790108377-be9c29b29330?w=400",
    },
    DemoUser {
        email: "joao@demo.com",
        name: "João Santos",
        photo_url: "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=400",
    },
    DemoUser {
        email: "ana@demo.com",
        name: "Ana Oliveira",
        photo_url: "https://images.unsplash.com/photo-1438761681033-6461ffad8d80?w=400",
    },
    DemoUser {
        email: "pedro@demo.com",
        name: "Pedro Costa",
        photo_url: "https://images.unsplash.com/photo-1500648767791-00dcc994a43e?w=400",
    },
];

const DEMO_ITEMS: [DemoItem; 12] = [
    DemoItem {
        title: "iPhone 12 Pro",
        description: "128GB, pacific blue. Battery at 85%, no scratches. Comes with the original charger.",
        category: ItemCategory::Electronics,
        photo_url: "https://images.unsplash.com/photo-1605236453806-6ff36851218e?w=400",
    },
    DemoItem {
        title: "Leather Jacket",
        description: "Genuine leather, size M. Worn a few times, great condition.",
        category: ItemCategory::Clothing,
        photo_url: "https://images.unsplash.com/photo-1551028719-00167b16eac5?w=400",
    },
    DemoItem {
        title: "Harry Potter Collection",
        description: "All 7 hardcover books. Special edition.",
        category: ItemCategory::Books,
        photo_url: "https://images.unsplash.com/photo-1551269901-5c5e14c25df7?w=400",
    },
    DemoItem {
        title: "Nintendo Switch",
        description: "Red and blue Joy-Cons. Includes 3 games and a protective case.",
        category: ItemCategory::Electronics,
        photo_url: "https://images.unsplash.com/photo-1578303512597-81e6cc155b3e?w=400",
    },
    DemoItem {
        title: "Nike Air Max",
        description: "Air Max 90, size 42. Worn only 3 times, perfect condition.",
        category: ItemCategory::Clothing,
        photo_url: "https://images.unsplash.com/photo-1542291026-7eec264c27ff?w=400",
    },
    DemoItem {
        title: "Yamaha Guitar",
        description: "Yamaha C40 acoustic, nylon strings. Great for beginners. Includes a gig bag.",
        category: ItemCategory::Other,
        photo_url: "https://images.unsplash.com/photo-1510915361894-db8b60106cb1?w=400",
    },
    DemoItem {
        title: "Coffee Table",
        description: "Solid wood, rustic style. 100x60x45cm.",
        category: ItemCategory::Furniture,
        photo_url: "https://images.unsplash.com/photo-1533090161767-e6ffed986c88?w=400",
    },
    DemoItem {
        title: "Caloi Bicycle",
        description: "26\" wheels, 21 speeds. Good on trails and in the city. Recently serviced.",
        category: ItemCategory::Sports,
        photo_url: "https://images.unsplash.com/photo-1485965120184-e220f721d03e?w=400",
    },
    DemoItem {
        title: "PlayStation 4",
        description: "PS4 Slim 500GB with 2 controllers and 5 games. Works perfectly.",
        category: ItemCategory::Electronics,
        photo_url: "https://images.unsplash.com/photo-1606144042614-b2417e99c4e3?w=400",
    },
    DemoItem {
        title: "Nespresso Machine",
        description: "Red Inissia. Barely used, comes with a capsule kit.",
        category: ItemCategory::Home,
        photo_url: "https://images.unsplash.com/photo-1517668808822-9ebb02f2a0e6?w=400",
    },
    DemoItem {
        title: "Element Skateboard",
        description: "Complete Element board, 8.0 deck. New wheels and bearings.",
        category: ItemCategory::Sports,
        photo_url: "https://images.unsplash.com/photo-1547447134-cd3f5c716030?w=400",
    },
    DemoItem {
        title: "North Face Backpack",
        description: "40L, ideal for trips and hikes. Plenty of compartments.",
        category: ItemCategory::Sports,
        photo_url: "https://images.unsplash.com/photo-1553062407-98eeb64c6a62?w=400",
    },
];

/// What [`seed_demo_data`] inserted. Empty when the store already had users.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub users: Vec<User>,
    pub items: Vec<Item>,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.items.is_empty()
    }
}

/// Random instant within the last `days` days.
fn backdated(rng: &mut impl Rng, days: i64) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::seconds(rng.gen_range(0..days * 86_400))
}

pub async fn seed_demo_data<S: Store>(store: &S) -> Result<SeedReport> {
    if store.count_where::<StoredUser>(&Filter::new()).await? > 0 {
        info!("demo data already present, skipping seed");
        return Ok(SeedReport::default());
    }

    let now = Utc::now();
    let mut report = SeedReport::default();

    // The rng is not Send, so draw every timestamp before the first await.
    let (user_times, item_times) = {
        let mut rng = rand::thread_rng();
        let users: Vec<_> = DEMO_USERS.iter().map(|_| backdated(&mut rng, 30)).collect();
        let items: Vec<_> = DEMO_ITEMS.iter().map(|_| backdated(&mut rng, 14)).collect();
        (users, items)
    };

    for (demo, created_at) in DEMO_USERS.iter().zip(user_times) {
        let stored = StoredUser {
            user: User {
                id: generate_id(),
                email: Some(demo.email.to_string()),
                name: demo.name.to_string(),
                photo_url: Some(demo.photo_url.to_string()),
                is_anonymous: false,
                created_at,
                updated_at: now,
            },
            password_hash: Some(hash_password(DEMO_PASSWORD)),
        };
        store.append(&stored).await?;
        report.users.push(stored.into_user());
    }

    for (i, (demo, created_at)) in DEMO_ITEMS.iter().zip(item_times).enumerate() {
        let owner = &report.users[i % report.users.len()];
        let item = Item {
            id: generate_id(),
            user_id: owner.id.clone(),
            title: demo.title.to_string(),
            description: demo.description.to_string(),
            category: demo.category,
            photo_url: demo.photo_url.to_string(),
            created_at,
            updated_at: now,
        };
        store.append(&item).await?;
        report.items.push(item);
    }

    info!(
        users = report.users.len(),
        items = report.items.len(),
        "seeded demo data"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::{AuthService, LoginCredentials};
    use crate::services::testing::{local, remote};
    use std::sync::Arc;

    async fn seeds_once<S: Store>(store: Arc<S>) {
        let report = seed_demo_data(store.as_ref()).await.unwrap();
        assert_eq!(report.users.len(), 4);
        assert_eq!(report.items.len(), 12);

        // round-robin: three items each
        for user in &report.users {
            let owned = report.items.iter().filter(|i| i.user_id == user.id).count();
            assert_eq!(owned, 3);
        }
        let oldest_allowed = Utc::now() - Duration::days(14) - Duration::minutes(1);
        assert!(report.items.iter().all(|i| i.created_at >= oldest_allowed));

        let again = seed_demo_data(store.as_ref()).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.get_collection::<Item>().await.unwrap().len(), 12);

        // demo accounts can sign in
        let auth = AuthService::new(store);
        let user = auth
            .login(LoginCredentials {
                email: "ana@demo.com".into(),
                password: DEMO_PASSWORD.into(),
            })
            .await
            .unwrap();
        assert_eq!(user.name, "Ana Oliveira");
    }

    #[tokio::test]
    async fn seeds_once_local() {
        seeds_once(local()).await;
    }

    #[tokio::test]
    async fn seeds_once_remote() {
        seeds_once(remote()).await;
    }
}

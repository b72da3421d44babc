//! Demo documents for the in-memory backend.

use serde_json::json;
use wander_core::backend::{BackendError, DocumentStore, Query};
use wander_core::model::{Reward, collections};

const DEMO_LOCATIONS: &[(&str, &str, &str)] = &[
    ("Harbor Taco Stand", "Food & Drink", "12 Pier Rd"),
    ("Night Market Noodles", "Food & Drink", "3 Lantern Ave"),
    ("Ridge Loop Trail", "Hiking", "Ridge Trailhead"),
    ("Falls Overlook", "Hiking", "Route 9, mile 14"),
    ("Old Mill Murals", "Art", "40 Mill St"),
    ("Riverside Kayaks", "Water Sports", "Dock 2"),
    ("Glow Bowl", "Nightlife", "88 Neon Blvd"),
];

fn demo_rewards() -> Vec<Reward> {
    vec![
        Reward {
            title: "Free Coffee".to_string(),
            description: "Redeem for a small coffee at partner cafés.".to_string(),
            points_required: 100,
            gradient_start: "#FF8A65".to_string(),
            gradient_end: "#FF7043".to_string(),
            ..Reward::default()
        },
        Reward {
            title: "Adventure Sticker Pack".to_string(),
            description: "Vinyl stickers for your water bottle.".to_string(),
            points_required: 150,
            gradient_start: "#66BB6A".to_string(),
            gradient_end: "#43A047".to_string(),
            ..Reward::default()
        },
        Reward {
            title: "10% Off Gear".to_string(),
            description: "Save on your next adventure gear purchase.".to_string(),
            points_required: 300,
            ..Reward::default()
        },
    ]
}

/// Inserts the demo rewards unless the store already has some.
pub async fn seed_rewards_if_empty<S: DocumentStore>(store: &S) -> Result<usize, BackendError> {
    let existing = store
        .query(&Query::collection(collections::REWARDS).limit(1))
        .await?;
    if !existing.is_empty() {
        return Ok(0);
    }
    let rewards = demo_rewards();
    for reward in &rewards {
        let mut data = serde_json::to_value(reward)?;
        if let Some(fields) = data.as_object_mut() {
            fields.remove("id");
        }
        store.insert(collections::REWARDS, data).await?;
    }
    Ok(rewards.len())
}

/// Locations, challenges, rewards and one user profile.
pub async fn seed_demo<S: DocumentStore>(store: &S, uid: &str) -> Result<(), BackendError> {
    for (title, category, address) in DEMO_LOCATIONS {
        store
            .insert(
                collections::LOCATIONS,
                json!({
                    "title": title,
                    "description": format!("A local favorite in {category}."),
                    "category": category,
                    "address": address,
                }),
            )
            .await?;
    }

    for (id, title, kind, goal, points) in [
        ("shutterbug", "Shutterbug", "photos", 3, 50),
        ("critic", "Local Critic", "reviews", 2, 40),
        ("wanderer", "Wanderer", "spots", 5, 100),
    ] {
        store
            .set(
                collections::CHALLENGES,
                id,
                json!({
                    "title": title,
                    "description": format!("Reach {goal} {kind}"),
                    "points": points,
                    "goal": goal,
                    "fieldType": kind,
                    "active": true,
                }),
            )
            .await?;
    }

    seed_rewards_if_empty(store).await?;

    store
        .set(
            collections::USERS,
            uid,
            json!({
                "uid": uid,
                "name": "Demo Explorer",
                "email": format!("{uid}@example.com"),
                "points": 120,
            }),
        )
        .await?;
    tracing::info!("[seed] Seeded {} locations for {}", DEMO_LOCATIONS.len(), uid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use wander_core::MemoryBackend;
    use wander_core::discovery::DiscoveryService;

    use super::*;

    #[tokio::test]
    async fn test_seed_rewards_only_once() {
        let backend = MemoryBackend::default();
        assert_eq!(seed_rewards_if_empty(&backend).await.unwrap(), 3);
        assert_eq!(seed_rewards_if_empty(&backend).await.unwrap(), 0);

        let rewards = wander_core::RewardsService::new(backend)
            .active_rewards()
            .await
            .unwrap();
        let titles: Vec<_> = rewards.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Free Coffee", "Adventure Sticker Pack", "10% Off Gear"]);
        assert!(rewards.iter().all(|r| !r.id.is_empty()));
        assert!(rewards.iter().all(|r| r.gradient().is_ok()));
    }

    #[tokio::test]
    async fn test_seed_demo_categories() {
        let backend = MemoryBackend::default();
        seed_demo(&backend, "u1").await.unwrap();
        let categories = DiscoveryService::new(backend).load_categories().await.unwrap();
        assert_eq!(
            categories,
            vec!["Art", "Food & Drink", "Hiking", "Nightlife", "Water Sports"]
        );
    }
}

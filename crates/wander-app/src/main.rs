//! Wander Wheel host
//!
//! Headless driver for one discovery session: spins the category wheel,
//! picks a location, records a few contributions and lets the rewards
//! listener settle challenge awards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wander_core::discovery::{self, Acceleration};
use wander_core::model::{BADGES, Location};
use wander_core::rewards::{self, LevelProgress};
use wander_core::{
    DiscoveryService, MemoryBackend, RewardsService, SelectionWheel, ShakeDetector, SocialService,
    WheelLayout,
};

use crate::config::AppConfig;
use crate::home::TraceCanvas;

mod config;
mod home;
mod progress;
mod seed;

/// Scripted accelerometer readings standing in for the device sensor.
const SENSOR_SCRIPT: &[(u64, Acceleration)] = &[
    (0, Acceleration { x: 0.0, y: 9.8, z: 0.0 }),
    (300, Acceleration { x: 14.0, y: 9.8, z: 1.0 }),
    (900, Acceleration { x: -6.0, y: 9.8, z: 0.5 }),
    (1500, Acceleration { x: 8.0, y: 2.0, z: 0.5 }),
];

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };
    let uid = config.user_id.clone();

    let backend = MemoryBackend::default();
    seed::seed_demo(&backend, &uid).await.context("Failed to seed demo data")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let listener = tokio::spawn(progress::watch_progress(
        RewardsService::new(backend.clone()),
        uid.clone(),
        config.level_size,
        shutdown_rx.clone(),
    ));

    let discovery = DiscoveryService::new(backend.clone());
    let categories = discovery.load_categories().await?;
    let category = spin_for_category(&config, &categories, &mut rng, shutdown_rx).await?;
    let location = discovery.random_location_in(&category, &mut rng).await?;
    tracing::info!("Adventure: {} ({}) at {}", location.title, category, location.address);

    contribute(&SocialService::new(backend.clone()), &uid, &location).await?;

    match discovery.adventure_day(&categories, &mut rng).await {
        Ok(day) => tracing::info!("Adventure day: eat at {}, then {}", day.food.title, day.activity.title),
        Err(err) => tracing::warn!("No adventure day: {err}"),
    }

    // Give the listener a moment to settle the new contributions.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let service = RewardsService::new(backend);
    redeem_best(&service, &uid).await?;

    let _ = shutdown_tx.send(true);
    let report = listener.await.context("Rewards listener panicked")??;
    summarize(&service, &uid, config.level_size, report.awards).await
}

/// Home screen: waits for a shake, spins the category wheel and returns the
/// category it landed on.
async fn spin_for_category(
    config: &AppConfig,
    categories: &[String],
    rng: &mut ChaCha8Rng,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<String> {
    let mut wheel = SelectionWheel::with_seed(config.wheel.clone(), rng.random());
    wheel.set_segments(categories.iter().map(String::as_str));

    let mut shake = ShakeDetector::default();
    let shaken = SENSOR_SCRIPT
        .iter()
        .any(|(at, sample)| shake.observe(*sample, Duration::from_millis(*at)));
    let Some(target) = shaken
        .then(|| discovery::pick_target(wheel.segment_count(), rng))
        .flatten()
    else {
        anyhow::bail!("Wheel was never spun");
    };

    let layout = WheelLayout::from_size(config.canvas_width, config.canvas_height);
    let mut canvas = TraceCanvas::default();
    let result = home::drive_spin(
        &mut wheel,
        target,
        &layout,
        &mut canvas,
        Duration::from_secs_f32(config.frame_interval()),
        shutdown,
    )
    .await?;
    tracing::info!(
        "Painted {} frames ({} wedges, {} labels)",
        canvas.frames,
        canvas.wedges,
        canvas.labels
    );

    result.label.context("Spin landed on nothing")
}

/// Location detail and profile screens.
async fn contribute(
    social: &SocialService<MemoryBackend>,
    uid: &str,
    location: &Location,
) -> anyhow::Result<()> {
    let location_id = location.id.as_deref().unwrap_or_default();
    social.toggle_visited(uid, location_id).await?;
    social.toggle_favorite(uid, location_id).await?;
    social
        .post_review(uid, location_id, 5.0, "Worth the trip, would spin again.")
        .await?;

    let reviews = social.reviews_for(location_id).await?;
    if let Some(average) = wander_core::social::average_rating(&reviews) {
        tracing::info!("{} has {} reviews, {:.1} stars", location.title, reviews.len(), average);
    }
    for _ in 0..3 {
        social.upload_photo(uid, vec![0xFF, 0xD8, 0xFF, 0xE0]).await?;
    }

    social.update_bio(uid, "Spinning my way through town.").await?;
    let favorites = social.favorite_locations(uid).await?;
    tracing::info!(
        "Profile: {} favorites, {} friends, {} reviews",
        favorites.len(),
        social.friend_count(uid).await?,
        social.review_count(uid).await?
    );
    for found in social.search_users(uid, "demo").await? {
        tracing::info!("Found {} ({:?})", found.name, found.status);
    }
    Ok(())
}

/// Spends points on the priciest reward the user can afford.
async fn redeem_best(service: &RewardsService<MemoryBackend>, uid: &str) -> anyhow::Result<()> {
    let rewards_list = service.active_rewards().await?;
    let user = service.user(uid).await?;
    if let Some(reward) = rewards_list
        .iter()
        .filter(|r| u64::from(r.points_required) <= user.points)
        .max_by_key(|r| r.points_required)
    {
        let left = service.redeem(uid, reward).await?;
        match reward.gradient() {
            Ok((from, to)) => tracing::info!(
                "Redeemed {} ({} points left), card {} to {}",
                reward.title,
                left,
                from.to_hex(),
                to.to_hex()
            ),
            Err(err) => tracing::warn!("Redeemed {} ({} points left), bad card colors: {err}", reward.title, left),
        }
    }
    Ok(())
}

async fn summarize(
    service: &RewardsService<MemoryBackend>,
    uid: &str,
    level_size: u64,
    awards: usize,
) -> anyhow::Result<()> {
    let user = service.user(uid).await?;
    let level = LevelProgress::with_level_size(user.points, level_size);
    let counts = service.contributions(uid).await?;
    tracing::info!(
        "{}: level {} ({} points), contributor score {}, {} awards this session",
        user.name,
        level.level,
        user.points,
        counts.score(),
        awards
    );
    if let Some(badge) = rewards::badge_status(&BADGES, user.points)
        .into_iter()
        .find(|b| !b.unlocked)
    {
        tracing::info!("Next badge: {} in {} points", badge.badge.title, badge.points_remaining);
    }
    Ok(())
}

//! Category wheel data and random location picking for the home screen.

use std::time::Duration;

use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::backend::{BackendError, Document, DocumentStore, Query};
use crate::model::{Location, collections};

/// Category paired with an activity on a generated adventure day.
pub const FOOD_CATEGORY: &str = "Food & Drink";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No locations found in database")]
    NoLocations,

    #[error("Could not find any categories in database")]
    NoCategories,

    #[error("No locations found for '{0}'")]
    EmptyCategory(String),
}

/// Distinct, trimmed, non-blank categories in sorted order.
pub fn categories_from<'a, I>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<String> = categories
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    unique.sort();
    unique.dedup();
    unique
}

/// Uniformly picks a wheel target, or `None` for an empty wheel.
pub fn pick_target<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Option<usize> {
    (count > 0).then(|| rng.random_range(0..count))
}

/// A food stop plus an activity from another category.
#[derive(Debug, Clone, PartialEq)]
pub struct AdventureDay {
    pub food: Location,
    pub activity: Location,
}

pub(crate) fn location_of(doc: &Document) -> Option<Location> {
    match doc.decode::<Location>() {
        Ok(mut location) => {
            location.id = Some(doc.id.clone());
            Some(location)
        }
        Err(err) => {
            tracing::warn!("[discovery] Skipping location: {err}");
            None
        }
    }
}

/// Reads locations and picks random ones.
pub struct DiscoveryService<S> {
    store: S,
}

impl<S: DocumentStore> DiscoveryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Categories shown on the wheel.
    pub async fn load_categories(&self) -> Result<Vec<String>, DiscoveryError> {
        let snapshot = self
            .store
            .query(&Query::collection(collections::LOCATIONS))
            .await?;
        if snapshot.is_empty() {
            return Err(DiscoveryError::NoLocations);
        }

        let categories =
            categories_from(snapshot.documents.iter().filter_map(|d| d.str_field("category")));
        if categories.is_empty() {
            return Err(DiscoveryError::NoCategories);
        }
        tracing::info!("[discovery] Loaded {} categories", categories.len());
        Ok(categories)
    }

    pub async fn locations_in(&self, category: &str) -> Result<Vec<Location>, DiscoveryError> {
        let snapshot = self
            .store
            .query(&Query::collection(collections::LOCATIONS).where_eq("category", category))
            .await?;
        Ok(snapshot.documents.iter().filter_map(location_of).collect())
    }

    pub async fn random_location_in<R: Rng + ?Sized>(
        &self,
        category: &str,
        rng: &mut R,
    ) -> Result<Location, DiscoveryError> {
        let locations = self.locations_in(category).await?;
        locations
            .choose(rng)
            .cloned()
            .ok_or_else(|| DiscoveryError::EmptyCategory(category.to_string()))
    }

    /// A random food location plus a random location of a random other
    /// category from `categories`.
    pub async fn adventure_day<R: Rng + ?Sized>(
        &self,
        categories: &[String],
        rng: &mut R,
    ) -> Result<AdventureDay, DiscoveryError> {
        let food = self.random_location_in(FOOD_CATEGORY, rng).await?;

        let others: Vec<&String> = categories
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(FOOD_CATEGORY))
            .collect();
        let Some(category) = others.choose(rng) else {
            return Err(DiscoveryError::NoCategories);
        };
        let activity = self.random_location_in(category, rng).await?;
        Ok(AdventureDay { food, activity })
    }
}

/// Accelerometer sample in m/s^2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Turns accelerometer samples into debounced shake triggers.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    threshold: f32,
    debounce: Duration,
    last_sample: Option<Acceleration>,
    last_shake_at: Option<Duration>,
}

impl Default for ShakeDetector {
    fn default() -> Self {
        Self::new(10.0, Duration::from_millis(500))
    }
}

impl ShakeDetector {
    pub fn new(threshold: f32, debounce: Duration) -> Self {
        Self {
            threshold,
            debounce,
            last_sample: None,
            last_shake_at: None,
        }
    }

    /// Feeds a sample taken at `now` (monotonic). Consecutive samples are
    /// compared axis by axis; samples inside the debounce window after a
    /// shake are ignored. The first sample only primes the detector.
    pub fn observe(&mut self, sample: Acceleration, now: Duration) -> bool {
        if self
            .last_shake_at
            .is_some_and(|at| now.saturating_sub(at) <= self.debounce)
        {
            return false;
        }

        let shaken = self.last_sample.is_some_and(|last| {
            (last.x - sample.x).abs() > self.threshold
                || (last.y - sample.y).abs() > self.threshold
                || (last.z - sample.z).abs() > self.threshold
        });
        self.last_sample = Some(sample);
        if shaken {
            self.last_shake_at = Some(now);
            tracing::debug!("[discovery] Shake detected");
        }
        shaken
    }
}

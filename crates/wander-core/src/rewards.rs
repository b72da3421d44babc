//! Points, levels, challenge completions, badges and the rewards store.

use serde_json::json;
use thiserror::Error;

use crate::backend::{BackendError, DocumentStore, Mutation, Query, Snapshot};
use crate::model::{Badge, Challenge, ChallengeKind, Reward, UserProfile, collections};

/// Points per level.
pub const DEFAULT_LEVEL_SIZE: u64 = 1000;

#[derive(Error, Debug)]
pub enum RewardsError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Challenge {0} has no completion counter")]
    UntrackedChallenge(String),

    #[error("Not enough points: needed {needed}, available {available}")]
    InsufficientPoints { needed: u64, available: u64 },

    #[error("Reward is not active: {0}")]
    InactiveReward(String),
}

/// Where a point total sits within the level ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u64,
    pub points: u64,
    /// Percentage of the current level already earned (0..=99).
    pub percent: u8,
    pub points_to_next: u64,
}

impl LevelProgress {
    pub fn from_points(points: u64) -> Self {
        Self::with_level_size(points, DEFAULT_LEVEL_SIZE)
    }

    pub fn with_level_size(points: u64, level_size: u64) -> Self {
        let level_size = level_size.max(1);
        let level = points / level_size + 1;
        let floor = (level - 1) * level_size;
        let next = level * level_size;
        let percent = (points - floor) * 100 / level_size;
        Self {
            level,
            points,
            percent: u8::try_from(percent).unwrap_or(100),
            points_to_next: next - points,
        }
    }
}

/// Completions earned but not yet recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    /// Newly earned completions.
    pub completions: u32,
    pub points: u64,
    /// Recorded completions after the award is applied.
    pub total_completions: u32,
    /// Recorded completions the award was computed against.
    pub previous_completions: u32,
}

/// Progress of one user against one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeProgress {
    pub challenge: Challenge,
    pub progress: u32,
    /// Completions already recorded on the user document.
    pub recorded: u32,
}

impl ChallengeProgress {
    pub fn new(challenge: Challenge, progress: u32, recorded: u32) -> Self {
        Self {
            challenge,
            progress,
            recorded,
        }
    }

    /// Completions earned by the current progress.
    pub fn completions(&self) -> u32 {
        if self.challenge.goal == 0 {
            0
        } else {
            self.progress / self.challenge.goal
        }
    }

    /// Goal of the next, not yet recorded completion.
    pub fn display_goal(&self) -> u32 {
        self.challenge
            .goal
            .saturating_mul(self.recorded.saturating_add(1))
    }

    pub fn percent(&self) -> u8 {
        let goal = self.display_goal();
        if goal == 0 {
            return 0;
        }
        let percent = (u64::from(self.progress) * 100 / u64::from(goal)).min(100);
        u8::try_from(percent).unwrap_or(100)
    }

    /// Text such as `3/5 Photos`.
    pub fn label(&self) -> String {
        let unit = self.challenge.field_type.unit();
        if unit.is_empty() {
            format!("{}/{}", self.progress, self.display_goal())
        } else {
            format!("{}/{} {}", self.progress, self.display_goal(), unit)
        }
    }

    pub fn pending_award(&self) -> Option<Award> {
        let earned = self.completions();
        if earned <= self.recorded {
            return None;
        }
        let completions = earned - self.recorded;
        Some(Award {
            completions,
            points: u64::from(self.challenge.points) * u64::from(completions),
            total_completions: earned,
            previous_completions: self.recorded,
        })
    }
}

/// Whether a badge is unlocked for a point total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeStatus {
    pub badge: Badge,
    pub unlocked: bool,
    pub points_remaining: u64,
}

/// Badge states ordered by required points.
pub fn badge_status(badges: &[Badge], points: u64) -> Vec<BadgeStatus> {
    let mut statuses: Vec<BadgeStatus> = badges
        .iter()
        .map(|badge| {
            let required = u64::from(badge.points_required);
            BadgeStatus {
                badge: *badge,
                unlocked: points >= required,
                points_remaining: required.saturating_sub(points),
            }
        })
        .collect();
    statuses.sort_by_key(|s| s.badge.points_required);
    statuses
}

pub fn contributor_score(photos: u32, reviews: u32, spots: u32) -> u64 {
    u64::from(photos) + u64::from(reviews) + u64::from(spots)
}

/// Progress counts for a user, each counted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContributionCounts {
    pub photos: u32,
    pub reviews: u32,
    pub spots: u32,
}

impl ContributionCounts {
    pub fn for_kind(&self, kind: &ChallengeKind) -> Option<u32> {
        match kind {
            ChallengeKind::Photos => Some(self.photos),
            ChallengeKind::Reviews => Some(self.reviews),
            ChallengeKind::Spots => Some(self.spots),
            ChallengeKind::Other(_) => None,
        }
    }

    pub fn score(&self) -> u64 {
        contributor_score(self.photos, self.reviews, self.spots)
    }
}

fn count(snapshot: &Snapshot) -> u32 {
    u32::try_from(snapshot.len()).unwrap_or(u32::MAX)
}

/// Queries whose result sizes drive challenge progress.
pub fn photos_query(uid: &str) -> Query {
    Query::collection(format!("{}/{uid}/{}", collections::USERS, collections::PHOTOS))
}

pub fn reviews_query(uid: &str) -> Query {
    Query::group(collections::REVIEWS).where_eq("userId", uid)
}

pub fn active_challenges_query() -> Query {
    Query::collection(collections::CHALLENGES).where_eq("active", true)
}

pub fn active_rewards_query() -> Query {
    Query::collection(collections::REWARDS)
        .where_eq("active", true)
        .order_by("pointsRequired", crate::backend::Direction::Ascending)
}

/// Points and challenge bookkeeping against a document store.
pub struct RewardsService<S> {
    store: S,
}

impl<S: DocumentStore> RewardsService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn user(&self, uid: &str) -> Result<UserProfile, RewardsError> {
        let doc = self
            .store
            .get(collections::USERS, uid)
            .await?
            .ok_or_else(|| RewardsError::UserNotFound(uid.to_string()))?;
        let mut user: UserProfile = doc.decode()?;
        if user.uid.is_empty() {
            user.uid = doc.id;
        }
        Ok(user)
    }

    pub async fn active_challenges(&self) -> Result<Vec<Challenge>, RewardsError> {
        let snapshot = self.store.query(&active_challenges_query()).await?;
        Ok(snapshot
            .documents
            .iter()
            .filter_map(|doc| {
                let mut challenge: Challenge = doc.decode().ok()?;
                challenge.id.clone_from(&doc.id);
                Some(challenge)
            })
            .collect())
    }

    pub async fn active_rewards(&self) -> Result<Vec<Reward>, RewardsError> {
        let snapshot = self.store.query(&active_rewards_query()).await?;
        Ok(snapshot
            .documents
            .iter()
            .filter_map(|doc| {
                let mut reward: Reward = doc.decode().ok()?;
                reward.id.clone_from(&doc.id);
                Some(reward)
            })
            .collect())
    }

    /// Counts photos, reviews and visited spots from the store itself.
    pub async fn contributions(&self, uid: &str) -> Result<ContributionCounts, RewardsError> {
        let photos = self.store.query(&photos_query(uid)).await?;
        let reviews = self.store.query(&reviews_query(uid)).await?;
        let user = self.user(uid).await?;
        Ok(ContributionCounts {
            photos: count(&photos),
            reviews: count(&reviews),
            spots: u32::try_from(user.visited_locations.len()).unwrap_or(u32::MAX),
        })
    }

    /// Progress against every active challenge.
    pub async fn progress(&self, uid: &str) -> Result<Vec<ChallengeProgress>, RewardsError> {
        let user = self.user(uid).await?;
        let counts = self.contributions(uid).await?;
        let challenges = self.active_challenges().await?;
        Ok(challenges
            .into_iter()
            .filter_map(|challenge| {
                let progress = counts.for_kind(&challenge.field_type)?;
                let recorded = user.completions_for(&challenge.field_type);
                Some(ChallengeProgress::new(challenge, progress, recorded))
            })
            .collect())
    }

    /// Records an award in one atomic batch. Fails with a conflict when the
    /// recorded completions changed since the award was computed, so the
    /// same completions are never paid twice.
    pub async fn award(
        &self,
        uid: &str,
        kind: &ChallengeKind,
        award: Award,
    ) -> Result<(), RewardsError> {
        let field = kind
            .completion_field()
            .ok_or_else(|| RewardsError::UntrackedChallenge(kind.as_str().to_string()))?;

        // Unknown users fail early.
        self.user(uid).await?;

        let guard = if award.previous_completions == 0 {
            // A fresh user document may not carry the counter yet.
            Mutation::expect_unset_or(collections::USERS, uid, field, 0)
        } else {
            Mutation::expect(collections::USERS, uid, field, award.previous_completions)
        };

        let mut batch = Vec::with_capacity(3);
        batch.push(guard);
        batch.push(Mutation::increment(
            collections::USERS,
            uid,
            "points",
            i64::try_from(award.points).unwrap_or(i64::MAX),
        ));
        batch.push(Mutation::merge(
            collections::USERS,
            uid,
            json!({ field: award.total_completions }),
        ));
        self.store.apply(batch).await?;

        tracing::info!(
            "[rewards] Awarded {} points for {} {} challenge completions",
            award.points,
            award.completions,
            kind.as_str()
        );
        Ok(())
    }

    /// Computes and records every pending award for the user.
    pub async fn settle(&self, uid: &str) -> Result<Vec<(ChallengeKind, Award)>, RewardsError> {
        let mut settled = Vec::new();
        for progress in self.progress(uid).await? {
            if let Some(award) = progress.pending_award() {
                let kind = progress.challenge.field_type.clone();
                self.award(uid, &kind, award).await?;
                settled.push((kind, award));
            }
        }
        Ok(settled)
    }

    /// Spends points on a store reward.
    pub async fn redeem(&self, uid: &str, reward: &Reward) -> Result<u64, RewardsError> {
        if !reward.active {
            return Err(RewardsError::InactiveReward(reward.title.clone()));
        }
        let user = self.user(uid).await?;
        let needed = u64::from(reward.points_required);
        if user.points < needed {
            return Err(RewardsError::InsufficientPoints {
                needed,
                available: user.points,
            });
        }

        self.store
            .apply(vec![
                Mutation::expect(collections::USERS, uid, "points", user.points),
                Mutation::increment(collections::USERS, uid, "points", -i64::from(reward.points_required)),
            ])
            .await?;

        tracing::info!(
            "[rewards] {} redeemed {:?} for {} points",
            uid,
            reward.title,
            needed
        );
        Ok(user.points - needed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::backend::{Document, Subscription};
    use crate::memory::MemoryBackend;
    use crate::model::BADGES;

    fn challenge(kind: ChallengeKind, goal: u32, points: u32) -> Challenge {
        Challenge {
            id: String::new(),
            title: "test".to_string(),
            description: String::new(),
            points,
            goal,
            field_type: kind,
            icon: String::new(),
            active: true,
        }
    }

    #[test]
    fn test_level_progress() {
        let level = LevelProgress::from_points(0);
        assert_eq!((level.level, level.percent, level.points_to_next), (1, 0, 1000));

        let level = LevelProgress::from_points(2350);
        assert_eq!(level.level, 3);
        assert_eq!(level.percent, 35);
        assert_eq!(level.points_to_next, 650);

        let level = LevelProgress::from_points(1000);
        assert_eq!((level.level, level.percent, level.points_to_next), (2, 0, 1000));
    }

    #[test]
    fn test_challenge_progress() {
        let progress = ChallengeProgress::new(challenge(ChallengeKind::Photos, 5, 50), 12, 1);
        assert_eq!(progress.completions(), 2);
        assert_eq!(progress.display_goal(), 10);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.label(), "12/10 Photos");
        assert_eq!(
            progress.pending_award(),
            Some(Award {
                completions: 1,
                points: 50,
                total_completions: 2,
                previous_completions: 1,
            })
        );

        let caught_up = ChallengeProgress::new(challenge(ChallengeKind::Reviews, 3, 20), 7, 2);
        assert_eq!(caught_up.pending_award(), None);
        assert_eq!(caught_up.percent(), 77);
    }

    #[test]
    fn test_zero_goal_never_completes() {
        let progress = ChallengeProgress::new(challenge(ChallengeKind::Spots, 0, 100), 40, 0);
        assert_eq!(progress.completions(), 0);
        assert_eq!(progress.percent(), 0);
        assert!(progress.pending_award().is_none());
    }

    #[test]
    fn test_badge_status() {
        let statuses = badge_status(&BADGES, 3200);
        assert_eq!(statuses.iter().filter(|s| s.unlocked).count(), 3);
        let next = statuses.iter().find(|s| !s.unlocked).unwrap();
        assert_eq!(next.badge.title, "Thrill-Seeker");
        assert_eq!(next.points_remaining, 1800);
    }

    #[test]
    fn test_contributor_score() {
        assert_eq!(contributor_score(3, 4, 5), 12);
        let counts = ContributionCounts {
            photos: 1,
            reviews: 2,
            spots: 3,
        };
        assert_eq!(counts.score(), 6);
        assert_eq!(counts.for_kind(&ChallengeKind::Other("x".into())), None);
    }

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::default();
        backend
            .set(
                "users",
                "u1",
                json!({ "uid": "u1", "points": 100, "visited_locations": ["a", "b", "c"] }),
            )
            .await
            .unwrap();
        backend
            .set(
                "challenges",
                "c-photos",
                json!({ "title": "Shutterbug", "points": 50, "goal": 2, "fieldType": "photos", "active": true }),
            )
            .await
            .unwrap();
        backend
            .set(
                "challenges",
                "c-spots",
                json!({ "title": "Wanderer", "points": 30, "goal": 3, "fieldType": "spots", "active": true }),
            )
            .await
            .unwrap();
        for i in 0..5 {
            backend
                .insert("users/u1/photos", json!({ "imageUrl": format!("p{i}") }))
                .await
                .unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_settle_awards_once() {
        let backend = seeded().await;
        let service = RewardsService::new(backend.clone());

        let settled = service.settle("u1").await.unwrap();
        assert_eq!(settled.len(), 2);

        let user = service.user("u1").await.unwrap();
        // 2 photo completions * 50 + 1 spot completion * 30
        assert_eq!(user.points, 230);
        assert_eq!(user.photo_challenge_completions, 2);
        assert_eq!(user.spots_challenge_completions, 1);

        assert!(service.settle("u1").await.unwrap().is_empty());
        assert_eq!(service.user("u1").await.unwrap().points, 230);
    }

    #[tokio::test]
    async fn test_stale_award_conflicts() {
        let backend = seeded().await;
        let service = RewardsService::new(backend);
        let progress = service.progress("u1").await.unwrap();
        let photos = progress
            .iter()
            .find(|p| p.challenge.field_type == ChallengeKind::Photos)
            .unwrap();
        let award = photos.pending_award().unwrap();

        service.award("u1", &ChallengeKind::Photos, award).await.unwrap();
        let err = service
            .award("u1", &ChallengeKind::Photos, award)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::Backend(BackendError::Conflict(_))));
        assert_eq!(service.user("u1").await.unwrap().points, 200);
    }

    /// Store whose reads yield, so concurrent awards interleave between
    /// their read and their commit.
    struct YieldingStore(MemoryBackend);

    impl DocumentStore for YieldingStore {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
            tokio::task::yield_now().await;
            self.0.get(collection, id).await
        }

        async fn query(&self, query: &Query) -> Result<Snapshot, BackendError> {
            self.0.query(query).await
        }

        async fn insert(&self, collection: &str, data: Value) -> Result<String, BackendError> {
            self.0.insert(collection, data).await
        }

        async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
            self.0.set(collection, id, data).await
        }

        async fn merge(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
            self.0.merge(collection, id, data).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<(), BackendError> {
            DocumentStore::delete(&self.0, collection, id).await
        }

        async fn apply(&self, mutations: Vec<Mutation>) -> Result<(), BackendError> {
            self.0.apply(mutations).await
        }

        fn subscribe(&self, query: Query) -> Subscription {
            self.0.subscribe(query)
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_awards_pay_once() {
        let backend = seeded().await;
        let service = RewardsService::new(YieldingStore(backend.clone()));
        let award = Award {
            completions: 1,
            points: 50,
            total_completions: 1,
            previous_completions: 0,
        };

        let (first, second) = tokio::join!(
            service.award("u1", &ChallengeKind::Photos, award),
            service.award("u1", &ChallengeKind::Photos, award),
        );
        assert_eq!(u8::from(first.is_ok()) + u8::from(second.is_ok()), 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(RewardsError::Backend(BackendError::Conflict(_)))));

        let user = RewardsService::new(backend).user("u1").await.unwrap();
        assert_eq!(user.points, 150);
        assert_eq!(user.photo_challenge_completions, 1);
    }

    #[tokio::test]
    async fn test_redeem() {
        let backend = seeded().await;
        let service = RewardsService::new(backend);
        let reward = Reward {
            title: "Free Coffee".to_string(),
            points_required: 60,
            ..Reward::default()
        };

        assert_eq!(service.redeem("u1", &reward).await.unwrap(), 40);
        let err = service.redeem("u1", &reward).await.unwrap_err();
        assert!(matches!(
            err,
            RewardsError::InsufficientPoints {
                needed: 60,
                available: 40
            }
        ));

        let inactive = Reward {
            active: false,
            ..reward
        };
        assert!(matches!(
            service.redeem("u1", &inactive).await,
            Err(RewardsError::InactiveReward(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_user() {
        let service = RewardsService::new(MemoryBackend::default());
        assert!(matches!(
            service.user("ghost").await,
            Err(RewardsError::UserNotFound(_))
        ));
    }
}

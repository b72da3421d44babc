//! Document shapes stored in the remote collections.
//!
//! Field names follow the camelCase keys used by the stored documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::color::{Color, ColorError};

/// Collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const LOCATIONS: &str = "locations";
    pub const FRIENDS: &str = "friends";
    pub const PHOTOS: &str = "photos";
    pub const REVIEWS: &str = "reviews";
    pub const CHALLENGES: &str = "challenges";
    pub const REWARDS: &str = "rewards";
}

/// A place that can be discovered through the wheel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub image_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A review left by a user for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_photo_url: Option<String>,
    pub rating: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Highest star rating a review may carry.
pub const MAX_RATING: f32 = 5.0;

/// Stored as the `status` field of a `friends` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    #[serde(rename = "accepted")]
    Friends,
    PendingIncoming,
    PendingOutgoing,
    #[default]
    NotFriends,
}

/// One entry of a user's `friends` sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Friend {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo_url: String,
    pub status: FriendshipStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Photo,
    Video,
}

impl MediaKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Video => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Photo => "image/jpeg",
            Self::Video => "video/mp4",
        }
    }
}

/// A document of a user's `photos` sub-collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Object path inside the media bucket.
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub uploaded_at: DateTime<Utc>,
}

/// An item of the rewards store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub points_required: u32,
    pub image_url: String,
    pub gradient_start: String,
    pub gradient_end: String,
    pub active: bool,
}

impl Default for Reward {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            points_required: 0,
            image_url: String::new(),
            gradient_start: "#5B8DEF".to_string(),
            gradient_end: "#3A6FE0".to_string(),
            active: true,
        }
    }
}

impl Reward {
    /// Card gradient colors, start then end.
    pub fn gradient(&self) -> Result<(Color, Color), ColorError> {
        Ok((
            Color::from_hex(&self.gradient_start)?,
            Color::from_hex(&self.gradient_end)?,
        ))
    }
}

/// What a challenge counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChallengeKind {
    Photos,
    Reviews,
    Spots,
    Other(String),
}

impl ChallengeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Photos => "photos",
            Self::Reviews => "reviews",
            Self::Spots => "spots",
            Self::Other(s) => s,
        }
    }

    /// Unit shown next to progress numbers.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Photos => "Photos",
            Self::Reviews => "Reviews",
            Self::Spots => "Spots",
            Self::Other(_) => "",
        }
    }

    /// User document field holding the recorded completions.
    pub fn completion_field(&self) -> Option<&'static str> {
        match self {
            Self::Photos => Some("photoChallengeCompletions"),
            Self::Reviews => Some("reviewsChallengeCompletions"),
            Self::Spots => Some("spotsChallengeCompletions"),
            Self::Other(_) => None,
        }
    }
}

impl From<String> for ChallengeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "photos" => Self::Photos,
            "reviews" => Self::Reviews,
            "spots" => Self::Spots,
            _ => Self::Other(value),
        }
    }
}

impl From<ChallengeKind> for String {
    fn from(kind: ChallengeKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Points per completion.
    pub points: u32,
    /// Progress needed per completion.
    pub goal: u32,
    pub field_type: ChallengeKind,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A points milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub title: &'static str,
    pub points_required: u32,
}

impl Badge {
    pub const fn new(title: &'static str, points_required: u32) -> Self {
        Self {
            title,
            points_required,
        }
    }
}

/// Built-in badges, ascending by points.
pub const BADGES: [Badge; 6] = [
    Badge::new("The Extrovert", 500),
    Badge::new("The Tourist", 1500),
    Badge::new("The Explorer", 3000),
    Badge::new("Thrill-Seeker", 5000),
    Badge::new("Daredevil", 7500),
    Badge::new("Adventurer", 10000),
];

/// A document of the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo_url: String,
    pub bio: String,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub joined_at: Option<DateTime<Utc>>,
    pub points: u64,
    #[serde(rename = "favorited_locations")]
    pub favorited_locations: Vec<String>,
    #[serde(rename = "visited_locations")]
    pub visited_locations: Vec<String>,
    pub photo_challenge_completions: u32,
    pub reviews_challenge_completions: u32,
    pub spots_challenge_completions: u32,
}

impl UserProfile {
    pub fn completions_for(&self, kind: &ChallengeKind) -> u32 {
        match kind {
            ChallengeKind::Photos => self.photo_challenge_completions,
            ChallengeKind::Reviews => self.reviews_challenge_completions,
            ChallengeKind::Spots => self.spots_challenge_completions,
            ChallengeKind::Other(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_kind_round_trips_through_strings() {
        let challenge: Challenge = serde_json::from_value(serde_json::json!({
            "title": "Shutterbug",
            "points": 50,
            "goal": 5,
            "fieldType": "photos"
        }))
        .unwrap();
        assert_eq!(challenge.field_type, ChallengeKind::Photos);
        assert!(challenge.active);

        let other = ChallengeKind::from("streaks".to_string());
        assert_eq!(other.as_str(), "streaks");
        assert_eq!(other.unit(), "");
        assert!(other.completion_field().is_none());
    }

    #[test]
    fn test_reward_gradient() {
        let reward = Reward::default();
        assert_eq!(
            reward.gradient().unwrap(),
            (Color::rgb(0x5B, 0x8D, 0xEF), Color::rgb(0x3A, 0x6F, 0xE0))
        );

        let broken = Reward {
            gradient_end: "#+F+F+F".to_string(),
            ..Reward::default()
        };
        assert_eq!(
            broken.gradient(),
            Err(ColorError::InvalidFormat("#+F+F+F".to_string()))
        );
    }

    #[test]
    fn test_user_profile_field_names() {
        let user: UserProfile = serde_json::from_value(serde_json::json!({
            "uid": "u1",
            "points": 1200,
            "visited_locations": ["a", "b"],
            "reviewsChallengeCompletions": 2
        }))
        .unwrap();
        assert_eq!(user.visited_locations.len(), 2);
        assert_eq!(user.completions_for(&ChallengeKind::Reviews), 2);
        assert!(user.favorited_locations.is_empty());
        assert_eq!(user.joined_at, None);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("favorited_locations").is_some());
        assert!(json.get("favorite_locations").is_none());
        assert!(json.get("joinedAt").is_some());
        assert!(json.get("photoChallengeCompletions").is_some());
    }

    #[test]
    fn test_user_profile_reads_favorites_and_join_date() {
        let user: UserProfile = serde_json::from_value(serde_json::json!({
            "uid": "u1",
            "bio": "Weekend hiker",
            "joinedAt": 1_700_000_000_000_i64,
            "favorited_locations": ["l1", "l2"]
        }))
        .unwrap();
        assert_eq!(user.favorited_locations, vec!["l1", "l2"]);
        assert_eq!(user.bio, "Weekend hiker");
        assert_eq!(user.joined_at.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    }

    #[test]
    fn test_friendship_status_strings() {
        assert_eq!(
            serde_json::to_value(FriendshipStatus::Friends).unwrap(),
            serde_json::json!("accepted")
        );
        let status: FriendshipStatus = serde_json::from_value(serde_json::json!("pending_incoming")).unwrap();
        assert_eq!(status, FriendshipStatus::PendingIncoming);
    }

    #[test]
    fn test_photo_uses_millisecond_timestamps() {
        let photo: Photo = serde_json::from_value(serde_json::json!({
            "path": "users/u1/photos/a.jpg",
            "uploadedAt": 1_700_000_000_000_i64,
            "type": "video"
        }))
        .unwrap();
        assert_eq!(photo.kind, MediaKind::Video);
        assert_eq!(photo.uploaded_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_badges_ascending() {
        assert!(BADGES.windows(2).all(|w| w[0].points_required < w[1].points_required));
    }
}

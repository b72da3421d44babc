//! Favorites, visits, reviews, friendships and media uploads.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::backend::{
    BackendError, Direction, DocumentStore, Mutation, ObjectStore, Query, collection_path,
};
use crate::discovery::location_of;
use crate::model::{
    Friend, FriendshipStatus, Location, MAX_RATING, MediaKind, Photo, Review, UserProfile,
    collections,
};
use crate::rewards::reviews_query;

const FAVORITES_FIELD: &str = "favorited_locations";
const VISITED_FIELD: &str = "visited_locations";
/// Profiles scanned per user search, in name order.
pub const USER_SEARCH_LIMIT: usize = 75;

#[derive(Error, Debug)]
pub enum SocialError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Rating must be between 1 and {max}, got {0}", max = MAX_RATING)]
    InvalidRating(f32),

    #[error("Review text must not be empty")]
    EmptyReview,

    #[error("Cannot befriend yourself")]
    SelfFriendship,

    #[error("No pending request from {0}")]
    NoPendingRequest(String),
}

fn friends_path(uid: &str) -> String {
    collection_path(&[collections::USERS, uid, collections::FRIENDS])
}

fn photos_path(uid: &str) -> String {
    collection_path(&[collections::USERS, uid, collections::PHOTOS])
}

fn reviews_path(location_id: &str) -> String {
    collection_path(&[collections::LOCATIONS, location_id, collections::REVIEWS])
}

/// An uploaded media item with a viewable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: String,
    pub photo: Photo,
    pub url: String,
}

/// User-to-user and user-to-location operations.
pub struct SocialService<S> {
    store: S,
}

impl<S: DocumentStore> SocialService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn user(&self, uid: &str) -> Result<UserProfile, SocialError> {
        let doc = self
            .store
            .get(collections::USERS, uid)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("{}/{uid}", collections::USERS)))?;
        let mut user: UserProfile = doc.decode()?;
        if user.uid.is_empty() {
            user.uid = doc.id;
        }
        Ok(user)
    }

    async fn toggle_membership(
        &self,
        uid: &str,
        field: &str,
        location_id: &str,
    ) -> Result<bool, SocialError> {
        let user = self.user(uid).await?;
        let current = match field {
            FAVORITES_FIELD => &user.favorited_locations,
            _ => &user.visited_locations,
        };
        let now_member = !current.iter().any(|id| id == location_id);
        let mutation = if now_member {
            Mutation::array_union(collections::USERS, uid, field, location_id)
        } else {
            Mutation::array_remove(collections::USERS, uid, field, location_id)
        };
        self.store.apply(vec![mutation]).await?;
        Ok(now_member)
    }

    /// Flips the favorite flag; returns whether the location is now a favorite.
    pub async fn toggle_favorite(&self, uid: &str, location_id: &str) -> Result<bool, SocialError> {
        self.toggle_membership(uid, FAVORITES_FIELD, location_id).await
    }

    /// Flips the visited flag; returns whether the location is now visited.
    pub async fn toggle_visited(&self, uid: &str, location_id: &str) -> Result<bool, SocialError> {
        self.toggle_membership(uid, VISITED_FIELD, location_id).await
    }

    /// Replaces the profile bio with the trimmed text.
    pub async fn update_bio(&self, uid: &str, bio: &str) -> Result<(), SocialError> {
        self.user(uid).await?;
        self.store
            .apply(vec![Mutation::merge(collections::USERS, uid, json!({ "bio": bio.trim() }))])
            .await?;
        Ok(())
    }

    /// The user's favorite locations, skipping ones that no longer exist.
    pub async fn favorite_locations(&self, uid: &str) -> Result<Vec<Location>, SocialError> {
        let user = self.user(uid).await?;
        let mut locations = Vec::with_capacity(user.favorited_locations.len());
        for id in &user.favorited_locations {
            match self.store.get(collections::LOCATIONS, id).await? {
                Some(doc) => locations.extend(location_of(&doc)),
                None => tracing::debug!("[social] Favorite {} no longer exists", id),
            }
        }
        Ok(locations)
    }

    /// Number of accepted friendships.
    pub async fn friend_count(&self, uid: &str) -> Result<usize, SocialError> {
        let snapshot = self
            .store
            .query(&Query::collection(friends_path(uid)).where_eq("status", "accepted"))
            .await?;
        Ok(snapshot.len())
    }

    /// Number of reviews the user wrote across all locations.
    pub async fn review_count(&self, uid: &str) -> Result<usize, SocialError> {
        Ok(self.store.query(&reviews_query(uid)).await?.len())
    }

    /// Stores a review signed with the author's profile name and photo.
    pub async fn post_review(
        &self,
        uid: &str,
        location_id: &str,
        rating: f32,
        text: &str,
    ) -> Result<String, SocialError> {
        if !(1.0..=MAX_RATING).contains(&rating) {
            return Err(SocialError::InvalidRating(rating));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SocialError::EmptyReview);
        }

        let user = self.user(uid).await.ok();
        let review = Review {
            user_id: uid.to_string(),
            user_name: user
                .as_ref()
                .map(|u| u.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Anonymous".to_string()),
            user_photo_url: user.map(|u| u.photo_url).filter(|p| !p.is_empty()),
            rating,
            text: text.to_string(),
            timestamp: Some(Utc::now()),
        };
        let id = self
            .store
            .insert(&reviews_path(location_id), serde_json::to_value(&review).map_err(BackendError::from)?)
            .await?;
        tracing::info!("[social] {} reviewed {} ({} stars)", uid, location_id, rating);
        Ok(id)
    }

    /// Reviews for a location, newest first.
    pub async fn reviews_for(&self, location_id: &str) -> Result<Vec<Review>, SocialError> {
        let snapshot = self
            .store
            .query(
                &Query::collection(reviews_path(location_id))
                    .order_by("timestamp", Direction::Descending),
            )
            .await?;
        Ok(snapshot.decode_all())
    }

    pub async fn send_request(&self, uid: &str, other: &str) -> Result<(), SocialError> {
        if uid == other {
            return Err(SocialError::SelfFriendship);
        }
        self.store
            .apply(vec![
                Mutation::set(&friends_path(uid), other, &json!({ "status": FriendshipStatus::PendingOutgoing }))?,
                Mutation::set(&friends_path(other), uid, &json!({ "status": FriendshipStatus::PendingIncoming }))?,
            ])
            .await?;
        tracing::info!("[social] {} sent a friend request to {}", uid, other);
        Ok(())
    }

    pub async fn accept(&self, uid: &str, other: &str) -> Result<(), SocialError> {
        if self.status(uid, other).await? != FriendshipStatus::PendingIncoming {
            return Err(SocialError::NoPendingRequest(other.to_string()));
        }
        let accepted = json!({ "status": FriendshipStatus::Friends });
        self.store
            .apply(vec![
                Mutation::merge(&friends_path(uid), other, accepted.clone()),
                Mutation::merge(&friends_path(other), uid, accepted),
            ])
            .await?;
        tracing::info!("[social] {} accepted {}", uid, other);
        Ok(())
    }

    /// Declines a request or ends a friendship, on both sides.
    pub async fn remove(&self, uid: &str, other: &str) -> Result<(), SocialError> {
        self.store
            .apply(vec![
                Mutation::delete(&friends_path(uid), other),
                Mutation::delete(&friends_path(other), uid),
            ])
            .await?;
        Ok(())
    }

    pub async fn status(&self, uid: &str, other: &str) -> Result<FriendshipStatus, SocialError> {
        let entry = self.store.get(&friends_path(uid), other).await?;
        Ok(entry
            .and_then(|doc| doc.field("status").cloned())
            .and_then(|status| serde_json::from_value(status).ok())
            .unwrap_or_default())
    }

    /// Friends and pending requests, joined with the other user's profile.
    pub async fn friends_of(&self, uid: &str) -> Result<Vec<Friend>, SocialError> {
        let entries = self.store.query(&Query::collection(friends_path(uid))).await?;
        let mut friends = Vec::with_capacity(entries.len());
        for entry in &entries.documents {
            if entry.id == uid {
                continue;
            }
            let Some(status) = entry
                .field("status")
                .cloned()
                .and_then(|s| serde_json::from_value::<FriendshipStatus>(s).ok())
            else {
                continue;
            };
            let Ok(profile) = self.user(&entry.id).await else {
                tracing::warn!("[social] Friend {} has no profile", entry.id);
                continue;
            };
            friends.push(Friend {
                uid: entry.id.clone(),
                name: profile.name,
                email: profile.email,
                photo_url: profile.photo_url,
                status,
            });
        }
        Ok(friends)
    }

    /// Users whose name starts with `text`, ignoring case, with the
    /// searcher's relationship to each. A blank search lists current friends
    /// and outgoing requests instead.
    pub async fn search_users(&self, uid: &str, text: &str) -> Result<Vec<Friend>, SocialError> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            let mut friends = self.friends_of(uid).await?;
            friends.retain(|f| {
                matches!(f.status, FriendshipStatus::Friends | FriendshipStatus::PendingOutgoing)
            });
            return Ok(friends);
        }

        let entries = self.store.query(&Query::collection(friends_path(uid))).await?;
        let status_of = |other: &str| {
            entries
                .documents
                .iter()
                .find(|entry| entry.id == other)
                .and_then(|entry| entry.field("status").cloned())
                .and_then(|status| serde_json::from_value(status).ok())
                .unwrap_or_default()
        };

        let candidates = self
            .store
            .query(
                &Query::collection(collections::USERS)
                    .order_by("name", Direction::Ascending)
                    .limit(USER_SEARCH_LIMIT),
            )
            .await?;
        let mut found = Vec::new();
        for doc in &candidates.documents {
            if doc.id == uid {
                continue;
            }
            let Ok(profile) = doc.decode::<UserProfile>() else {
                continue;
            };
            if !profile.name.to_lowercase().starts_with(&needle) {
                continue;
            }
            found.push(Friend {
                uid: doc.id.clone(),
                status: status_of(&doc.id),
                name: profile.name,
                email: profile.email,
                photo_url: profile.photo_url,
            });
        }
        Ok(found)
    }
}

impl<S: DocumentStore + ObjectStore> SocialService<S> {
    pub async fn upload_photo(&self, uid: &str, bytes: Vec<u8>) -> Result<MediaItem, SocialError> {
        self.upload_media(uid, MediaKind::Photo, bytes).await
    }

    /// Stores media bytes and records them in the user's `photos`.
    pub async fn upload_media(
        &self,
        uid: &str,
        kind: MediaKind,
        bytes: Vec<u8>,
    ) -> Result<MediaItem, SocialError> {
        let path = format!(
            "{}/{}.{}",
            photos_path(uid),
            uuid::Uuid::new_v4().simple(),
            kind.extension()
        );
        let url = self.store.upload(&path, bytes, kind.content_type()).await?;
        let photo = Photo {
            path,
            kind,
            uploaded_at: Utc::now(),
        };
        let id = self
            .store
            .insert(&photos_path(uid), serde_json::to_value(&photo).map_err(BackendError::from)?)
            .await?;
        tracing::info!("[social] Uploaded {:?} {}", kind, photo.path);
        Ok(MediaItem { id, photo, url })
    }

    /// Media of a user with time-limited URLs, newest first.
    pub async fn photos_of(
        &self,
        uid: &str,
        ttl: std::time::Duration,
    ) -> Result<Vec<MediaItem>, SocialError> {
        let snapshot = self
            .store
            .query(&Query::collection(photos_path(uid)).order_by("uploadedAt", Direction::Descending))
            .await?;
        let mut items = Vec::with_capacity(snapshot.len());
        for doc in &snapshot.documents {
            let photo: Photo = doc.decode()?;
            let url = self.store.signed_url(&photo.path, ttl).await?;
            items.push(MediaItem {
                id: doc.id.clone(),
                photo,
                url,
            });
        }
        Ok(items)
    }

    /// Removes the stored object and its record.
    pub async fn delete_photo(&self, uid: &str, item: &MediaItem) -> Result<(), SocialError> {
        match self.store.delete_object(&item.photo.path).await {
            Ok(()) | Err(BackendError::ObjectNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        DocumentStore::delete(&self.store, &photos_path(uid), &item.id).await?;
        Ok(())
    }
}

/// Mean star rating, or `None` without reviews.
#[allow(clippy::cast_precision_loss)]
pub fn average_rating(reviews: &[Review]) -> Option<f32> {
    if reviews.is_empty() {
        return None;
    }
    Some(reviews.iter().map(|r| r.rating).sum::<f32>() / reviews.len() as f32)
}

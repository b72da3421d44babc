//! Live rewards listener: settles challenge awards as contributions change.

use tokio::sync::watch;
use wander_core::backend::{BackendError, DocumentStore, Query};
use wander_core::model::{BADGES, collections};
use wander_core::rewards::{self, LevelProgress, RewardsError, RewardsService};

/// Summary of a finished listener run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressReport {
    pub snapshots: usize,
    pub awards: usize,
    pub points_awarded: u64,
}

async fn settle<S: DocumentStore>(
    service: &RewardsService<S>,
    uid: &str,
    report: &mut ProgressReport,
) -> Result<(), RewardsError> {
    report.snapshots += 1;
    match service.settle(uid).await {
        Ok(settled) => {
            for (kind, award) in settled {
                tracing::info!(
                    "[progress] {} challenge completed x{} (+{} points)",
                    kind.as_str(),
                    award.completions,
                    award.points
                );
                report.awards += 1;
                report.points_awarded += award.points;
            }
            Ok(())
        }
        // Lost a race with another writer; the next snapshot retries.
        Err(RewardsError::Backend(BackendError::Conflict(field))) => {
            tracing::warn!("[progress] Award for {} changed concurrently", field);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Listens to the user's photos, reviews and profile until `shutdown`
/// turns true, settling pending awards after every change.
pub async fn watch_progress<S: DocumentStore>(
    service: RewardsService<S>,
    uid: String,
    level_size: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ProgressReport, RewardsError> {
    let store = service.store();
    let mut photos = store.subscribe(rewards::photos_query(&uid));
    let mut reviews = store.subscribe(rewards::reviews_query(&uid));
    let mut user = store.subscribe(Query::document(collections::USERS, uid.as_str()));
    let mut report = ProgressReport::default();

    tracing::info!("[progress] Watching rewards progress of {}", uid);
    loop {
        tokio::select! {
            biased;
            Some(snapshot) = photos.next() => {
                tracing::debug!("[progress] {} photos", snapshot?.len());
                settle(&service, &uid, &mut report).await?;
            }
            Some(snapshot) = reviews.next() => {
                tracing::debug!("[progress] {} reviews", snapshot?.len());
                settle(&service, &uid, &mut report).await?;
            }
            Some(snapshot) = user.next() => {
                let snapshot = snapshot?;
                if let Some(points) = snapshot.documents.first().and_then(|d| d.u64_field("points")) {
                    let level = LevelProgress::with_level_size(points, level_size);
                    let unlocked = rewards::badge_status(&BADGES, points)
                        .iter()
                        .filter(|b| b.unlocked)
                        .count();
                    tracing::info!(
                        "[progress] Level {} ({}%), {} points, {} to next, {} badges",
                        level.level,
                        level.percent,
                        points,
                        level.points_to_next,
                        unlocked
                    );
                }
                settle(&service, &uid, &mut report).await?;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            else => break,
        }
    }

    photos.cancel();
    reviews.cancel();
    user.cancel();
    tracing::info!(
        "[progress] Stopped after {} snapshots, {} awards",
        report.snapshots,
        report.awards
    );
    Ok(report)
}

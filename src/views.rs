//! Duplicate-view suppression on top of the catalog store.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::security::viewer_fingerprint;
use crate::store::{CatalogStore, Reaction, ViewEvent};

/// How often expired view logs are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Request details the tracker needs about the viewer.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub ip: String,
    pub user_agent: String,
    pub referer: String,
}

#[derive(Clone)]
pub struct ViewTracker {
    store: CatalogStore,
    window: chrono::Duration,
}

impl ViewTracker {
    pub fn new(store: CatalogStore, window_secs: i64) -> Self {
        Self {
            store,
            window: chrono::Duration::seconds(window_secs.max(1)),
        }
    }

    /// `None` when the video does not exist, otherwise whether this request
    /// counted as a new view.
    pub async fn record(&self, video_id: &str, viewer: &Viewer) -> Result<Option<bool>> {
        let event = ViewEvent {
            video_id: video_id.to_string(),
            fingerprint: viewer_fingerprint(&viewer.ip),
            user_agent: viewer.user_agent.clone(),
            referer: viewer.referer.clone(),
        };
        let counted = self.store.record_view(&event, Utc::now(), self.window).await?;
        if counted == Some(true) {
            tracing::debug!(video_id, "view counted");
        }
        Ok(counted)
    }

    pub async fn react(&self, video_id: &str, reaction: Reaction) -> Result<Option<i64>> {
        self.store.record_reaction(video_id, reaction, Utc::now()).await
    }

    pub async fn sweep(&self) -> Result<u64> {
        self.store.prune_expired_views(Utc::now()).await
    }

    /// Runs [`Self::sweep`] every `every` until the handle is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tracker.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "pruned expired view logs"),
                    Err(err) => tracing::warn!(error = %format!("{err:#}"), "view log sweep failed"),
                }
            }
        })
    }
}

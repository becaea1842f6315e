//! Fetching a generated panel: poll for the image, look up its text, save
//! both to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;
use crate::story::{PanelData, StoryService};

/// Exponential backoff between image polls.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    /// Delay after the `attempt`-th (zero based) unsuccessful poll.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// A generated panel as exported next to its image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelView {
    pub wallet_id: String,
    pub panel: Option<PanelData>,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPanel {
    pub image_path: PathBuf,
    pub record_path: PathBuf,
}

pub struct PanelViewer {
    story: Arc<dyn StoryService>,
    policy: PollPolicy,
}

impl PanelViewer {
    pub fn new(story: Arc<dyn StoryService>, policy: PollPolicy) -> Self {
        Self { story, policy }
    }

    pub async fn find_panel(&self, wallet_id: &str) -> Result<Option<PanelData>, StoryError> {
        self.story.find_panel(wallet_id).await
    }

    pub async fn wait_for_image(&self, wallet_id: &str) -> Result<Vec<u8>, StoryError> {
        for attempt in 0..self.policy.max_attempts {
            if let Some(image) = self.story.fetch_image(wallet_id).await? {
                log::info!(
                    "image for {} ready after {} attempt(s), {} bytes",
                    wallet_id,
                    attempt + 1,
                    image.len()
                );
                return Ok(image);
            }
            if attempt + 1 < self.policy.max_attempts {
                let delay = self.policy.delay_for(attempt);
                log::debug!("image for {} not ready, retrying in {:?}", wallet_id, delay);
                tokio::time::sleep(delay).await;
            }
        }
        Err(StoryError::NotReady {
            wallet: wallet_id.to_string(),
            attempts: self.policy.max_attempts,
        })
    }

    /// Wait for the image, then attach the panel text if the service has it.
    pub async fn view(&self, wallet_id: &str) -> Result<PanelView, StoryError> {
        let image = self.wait_for_image(wallet_id).await?;
        let panel = match self.find_panel(wallet_id).await {
            Ok(panel) => panel,
            Err(err) => {
                log::warn!("panel text for {} unavailable: {}", wallet_id, err);
                None
            }
        };
        Ok(PanelView {
            wallet_id: wallet_id.to_string(),
            panel,
            image,
            fetched_at: Utc::now(),
        })
    }

    /// Write `story_panel_<wallet>.png` and `story_panel_<wallet>.json` into `dir`.
    pub fn save(view: &PanelView, dir: &Path) -> Result<SavedPanel, StoryError> {
        std::fs::create_dir_all(dir)?;
        let stem = format!("story_panel_{}", view.wallet_id);
        let image_path = dir.join(format!("{}.png", stem));
        let record_path = dir.join(format!("{}.json", stem));

        std::fs::write(&image_path, &view.image)?;
        let record = serde_json::to_string_pretty(view)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&record_path, record)?;

        Ok(SavedPanel {
            image_path,
            record_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStoryService;

    fn quick(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = PollPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn waits_until_image_appears() {
        let story = Arc::new(MockStoryService::new());
        story.set_image_after(2, vec![0x89, 0x50, 0x4e, 0x47]);
        let viewer = PanelViewer::new(story.clone(), quick(5));

        let image = viewer.wait_for_image("Wx1").await.unwrap();
        assert_eq!(image, vec![0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(story.image_fetches(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let story = Arc::new(MockStoryService::new());
        let viewer = PanelViewer::new(story.clone(), quick(3));

        let err = viewer.wait_for_image("Wx1").await.unwrap_err();
        assert!(matches!(err, StoryError::NotReady { attempts: 3, .. }));
        assert_eq!(story.image_fetches(), 3);
    }

    #[tokio::test]
    async fn view_attaches_matching_panel_text() {
        let story = Arc::new(MockStoryService::new());
        story.set_image_after(0, vec![1, 2, 3]);
        story.add_panel(PanelData {
            wallet_id: "someone-else".into(),
            scene_description: "wrong".into(),
            dialogue: "wrong".into(),
        });
        story.add_panel(PanelData {
            wallet_id: "Wx1".into(),
            scene_description: "A dog in a hat".into(),
            dialogue: "Wow.".into(),
        });
        let viewer = PanelViewer::new(story, quick(1));

        let view = viewer.view("Wx1").await.unwrap();
        let panel = view.panel.unwrap();
        assert_eq!(panel.scene_description, "A dog in a hat");
        assert_eq!(panel.dialogue, "Wow.");
    }

    #[test]
    fn save_writes_image_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let view = PanelView {
            wallet_id: "Wx1".into(),
            panel: Some(PanelData {
                wallet_id: "Wx1".into(),
                scene_description: "Scene".into(),
                dialogue: "Line".into(),
            }),
            image: vec![9, 9, 9],
            fetched_at: Utc::now(),
        };

        let saved = PanelViewer::save(&view, dir.path()).unwrap();
        assert_eq!(saved.image_path, dir.path().join("story_panel_Wx1.png"));
        assert_eq!(std::fs::read(&saved.image_path).unwrap(), vec![9, 9, 9]);

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.record_path).unwrap()).unwrap();
        assert_eq!(record["wallet_id"], "Wx1");
        assert_eq!(record["panel"]["sceneDescription"], "Scene");
        assert!(record.get("image").is_none());
    }
}

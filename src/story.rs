//! Client for the story service that turns a character selection into an
//! illustrated panel.
//!
//! Contract:
//! - `POST {api}/data` with `{"value": [..], "walletId": ".."}`
//! - `PUT {api}/panel-status/{walletId}` with `{"needNewPanel": true}`
//! - `GET {api}/data` returning `{"data": [{walletId, sceneDescription, dialogue}]}`
//! - `GET {image}` returning the panel image for one wallet
//!
//! Every request carries an `X-API-Key` header. Error responses carry
//! `{"error": ".."}`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Text generated for one wallet's panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelData {
    pub wallet_id: String,
    #[serde(default)]
    pub scene_description: String,
    #[serde(default)]
    pub dialogue: String,
}

#[derive(Serialize)]
struct CreateStoryBody<'a> {
    value: &'a [String],
    #[serde(rename = "walletId")]
    wallet_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PanelStatusBody {
    need_new_panel: bool,
}

#[derive(Deserialize)]
struct PanelList {
    #[serde(default)]
    data: Vec<PanelData>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[async_trait]
pub trait StoryService: Send + Sync {
    /// Store the selected characters for `wallet_id`.
    async fn submit_characters(&self, wallet_id: &str, characters: &[String])
        -> Result<(), StoryError>;

    /// Flag that `wallet_id` wants a new panel generated.
    async fn request_new_panel(&self, wallet_id: &str) -> Result<(), StoryError>;

    async fn list_panels(&self) -> Result<Vec<PanelData>, StoryError>;

    /// Image bytes for `wallet_id`, `None` while nothing has been generated.
    async fn fetch_image(&self, wallet_id: &str) -> Result<Option<Vec<u8>>, StoryError>;

    /// Submit the characters, then request a panel for them.
    async fn create_story(&self, wallet_id: &str, characters: &[String]) -> Result<(), StoryError> {
        self.submit_characters(wallet_id, characters).await?;
        self.request_new_panel(wallet_id).await
    }

    async fn find_panel(&self, wallet_id: &str) -> Result<Option<PanelData>, StoryError> {
        let panels = self.list_panels().await?;
        Ok(panels.into_iter().find(|p| p.wallet_id == wallet_id))
    }
}

/// [`StoryService`] over HTTP.
pub struct HttpStoryClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    image_url_template: String,
}

impl HttpStoryClient {
    /// `api_url` is the service root; `image_url_template` must contain
    /// `{wallet}`.
    pub fn new(api_url: &str, api_key: &str, image_url_template: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            image_url_template: image_url_template.to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("{}/data", self.api_url)
    }

    pub fn panel_status_url(&self, wallet_id: &str) -> String {
        format!("{}/panel-status/{}", self.api_url, wallet_id)
    }

    pub fn image_url(&self, wallet_id: &str) -> String {
        self.image_url_template
            .replace("{api}", &self.api_url)
            .replace("{wallet}", wallet_id)
    }

    async fn service_error(response: reqwest::Response) -> StoryError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.error,
            Err(_) if text.is_empty() => "no response body".to_string(),
            Err(_) => text,
        };
        StoryError::Service { status, message }
    }
}

#[async_trait]
impl StoryService for HttpStoryClient {
    async fn submit_characters(
        &self,
        wallet_id: &str,
        characters: &[String],
    ) -> Result<(), StoryError> {
        let response = self
            .client
            .post(self.data_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&CreateStoryBody {
                value: characters,
                wallet_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::service_error(response).await);
        }
        log::info!("stored {} characters for {}", characters.len(), wallet_id);
        Ok(())
    }

    async fn request_new_panel(&self, wallet_id: &str) -> Result<(), StoryError> {
        let response = self
            .client
            .put(self.panel_status_url(wallet_id))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&PanelStatusBody {
                need_new_panel: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::service_error(response).await);
        }
        log::info!("requested new panel for {}", wallet_id);
        Ok(())
    }

    async fn list_panels(&self) -> Result<Vec<PanelData>, StoryError> {
        let response = self
            .client
            .get(self.data_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::service_error(response).await);
        }
        let list: PanelList = response.json().await?;
        Ok(list.data)
    }

    async fn fetch_image(&self, wallet_id: &str) -> Result<Option<Vec<u8>>, StoryError> {
        let response = self
            .client
            .get(self.image_url(wallet_id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::service_error(response).await);
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_the_api_root() {
        let client = HttpStoryClient::new("https://story.example/api/", "k", "{api}/image/{wallet}");
        assert_eq!(client.data_url(), "https://story.example/api/data");
        assert_eq!(
            client.panel_status_url("Wx1"),
            "https://story.example/api/panel-status/Wx1"
        );
        assert_eq!(client.image_url("Wx1"), "https://story.example/api/image/Wx1");
    }

    #[test]
    fn image_template_may_point_elsewhere() {
        let client = HttpStoryClient::new(
            "https://story.example/api",
            "k",
            "https://cdn.example/panels/{wallet}.png",
        );
        assert_eq!(client.image_url("Wx1"), "https://cdn.example/panels/Wx1.png");
    }

    #[test]
    fn create_story_body_uses_wire_names() {
        let characters = vec!["Fred".to_string(), "Pesto".to_string()];
        let body = serde_json::to_value(CreateStoryBody {
            value: &characters,
            wallet_id: "Wx1",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"value": ["Fred", "Pesto"], "walletId": "Wx1"})
        );
    }

    #[test]
    fn panel_status_body_uses_wire_names() {
        let body = serde_json::to_value(PanelStatusBody {
            need_new_panel: true,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"needNewPanel": true}));
    }

    #[test]
    fn panel_list_tolerates_missing_text() {
        let list: PanelList =
            serde_json::from_str(r#"{"data":[{"walletId":"Wx1","dialogue":"hi"}]}"#).unwrap();
        assert_eq!(list.data[0].wallet_id, "Wx1");
        assert_eq!(list.data[0].scene_description, "");
        assert_eq!(list.data[0].dialogue, "hi");
    }
}

//! Google Cloud Vision text detection provider.

use super::{TextAnnotation, TextDetection, TextDetector};
use crate::config::VisionAuth;
use crate::google_auth::ServiceAccountAuth;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

enum Credentials {
    ApiKey(String),
    ServiceAccount(ServiceAccountAuth),
}

pub struct GoogleVisionProvider {
    credentials: Credentials,
    client: reqwest::Client,
}

impl GoogleVisionProvider {
    pub fn new(client: reqwest::Client, auth: &VisionAuth) -> anyhow::Result<Self> {
        let credentials = match auth {
            VisionAuth::ApiKey(key) => Credentials::ApiKey(key.clone()),
            VisionAuth::ServiceAccount(path) => {
                let sa = ServiceAccountAuth::from_file(path)?;
                info!("GoogleVisionProvider: using service account {}", sa.client_email());
                Credentials::ServiceAccount(sa)
            }
        };
        Ok(Self {
            credentials,
            client,
        })
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

fn build_request(image: &[u8]) -> AnnotateRequest {
    AnnotateRequest {
        requests: vec![AnnotateImageRequest {
            image: ImageContent {
                content: BASE64.encode(image),
            },
            features: vec![Feature {
                feature_type: "TEXT_DETECTION",
            }],
        }],
    }
}

fn into_detection(response: AnnotateResponse) -> TextDetection {
    let first = response.responses.into_iter().next().unwrap_or_default();
    TextDetection {
        annotations: first
            .text_annotations
            .into_iter()
            .map(|a| TextAnnotation {
                description: a.description,
            })
            .collect(),
        error: first.error.map(|s| s.message).filter(|m| !m.is_empty()),
    }
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl TextDetector for GoogleVisionProvider {
    fn name(&self) -> &str {
        "google_vision"
    }

    async fn detect_text(&self, image: &[u8]) -> anyhow::Result<TextDetection> {
        let body = build_request(image);

        let request = self.client.post(ANNOTATE_URL).json(&body);
        let request = match &self.credentials {
            Credentials::ApiKey(key) => request.query(&[("key", key)]),
            Credentials::ServiceAccount(sa) => {
                let token = sa.access_token(&self.client).await?;
                request.bearer_auth(token)
            }
        };

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Vision API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "GoogleVisionProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        let response: AnnotateResponse = serde_json::from_str(&raw_text)?;

        Ok(into_detection(response))
    }
}

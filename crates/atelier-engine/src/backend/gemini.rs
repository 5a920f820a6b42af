use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use atelier_contracts::media::{
    AspectRatio, EncodedImage, GeneratedImage, UploadedImage, VeoHistoryItem, VeoParams, VideoRef,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{EditingSuggestion, GenerativeBackend, ProgressSink};
use crate::config::GeminiConfig;

const PROVIDER: &str = "Gemini";

const ANALYZE_INSTRUCTION: &str = "Describe this image in detail as a reusable image-generation prompt: subject, clothing, setting, lighting, camera and style.";
const SUGGESTION_INSTRUCTION: &str = "Analyse this image. Return JSON with `analysis_prompt`, a detailed prompt that would recreate it, and `suggestion`, one creative edit that would make it more striking.";
const OPTIMIZE_INSTRUCTION: &str = "Rewrite the following image prompt so it is vivid, specific and well structured. Keep the original intent and reply with the prompt only.";
const INSPIRE_INSTRUCTION: &str = "Invent one original, cinematic cyberpunk image prompt in a single sentence. Reply with the prompt only.";
const UPSCALE_INSTRUCTION: &str = "Upscale this image to a higher resolution, restoring fine detail and sharpness without changing its content or composition.";
const ZOOM_OUT_INSTRUCTION: &str = "Zoom out from this image: keep the current content unchanged in the centre and extend the scene naturally on every side.";

pub struct GeminiBackend {
    config: GeminiConfig,
    api_key: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.config.api_base, model_path, method)
    }

    async fn send_with_transport_retries(
        &self,
        endpoint: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<HttpResponse> {
        let mut attempt = 0usize;
        loop {
            match build().query(&[("key", self.api_key.as_str())]).send().await {
                Ok(response) => return Ok(response),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("{PROVIDER} request failed ({endpoint})"));
                    if attempt >= self.config.transport_retries
                        || !is_retryable_transport_error(&err)
                    {
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = self.config.retry_backoff * attempt as u32;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .send_with_transport_retries(endpoint, || self.http.post(endpoint).json(payload))
            .await?;
        response_json_or_error(response).await
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value> {
        let response = self
            .send_with_transport_retries(endpoint, || self.http.get(endpoint))
            .await?;
        response_json_or_error(response).await
    }

    async fn generate_content(
        &self,
        model: &str,
        parts: Vec<Value>,
        generation_config: Value,
    ) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model, "generateContent");
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        });
        self.post_json(&endpoint, &payload).await
    }

    async fn edit_image(&self, image: &EncodedImage, instruction: &str) -> Result<EncodedImage> {
        let response = self
            .generate_content(
                &self.config.image_model,
                vec![inline_part(image), json!({ "text": instruction })],
                json!({ "responseModalities": ["IMAGE", "TEXT"] }),
            )
            .await?;
        extract_images(&response)?
            .into_iter()
            .next()
            .with_context(|| format!("{PROVIDER} returned no image"))
    }

    async fn generate_text(&self, parts: Vec<Value>) -> Result<String> {
        let response = self
            .generate_content(&self.config.text_model, parts, json!({}))
            .await?;
        extract_text(&response).with_context(|| format!("{PROVIDER} returned no text"))
    }

    async fn generate_json(&self, parts: Vec<Value>, schema: Value) -> Result<Value> {
        let response = self
            .generate_content(
                &self.config.text_model,
                parts,
                json!({
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                }),
            )
            .await?;
        let text = extract_text(&response).with_context(|| format!("{PROVIDER} returned no text"))?;
        serde_json::from_str(&text)
            .with_context(|| format!("{PROVIDER} returned malformed JSON: {}", truncate_text(&text, 200)))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_images(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[UploadedImage],
        count: usize,
    ) -> Result<Vec<GeneratedImage>> {
        let mut parts: Vec<Value> = references
            .iter()
            .map(|reference| inline_part(&reference.data))
            .collect();
        parts.push(json!({ "text": prompt }));
        let generation_config = json!({
            "responseModalities": ["IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio.as_str() },
        });

        // the image models answer with a single candidate, one request per variant
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let response = self
                .generate_content(&self.config.image_model, parts.clone(), generation_config.clone())
                .await?;
            for data in extract_images(&response)?.into_iter().take(1) {
                let alt = format!("Generated image {}", out.len() + 1);
                out.push(GeneratedImage::new(data, alt, prompt));
            }
        }
        if out.is_empty() {
            bail!("{PROVIDER} returned no images");
        }
        Ok(out)
    }

    async fn remove_background(
        &self,
        image: &EncodedImage,
        green_screen: bool,
    ) -> Result<EncodedImage> {
        let instruction = if green_screen {
            "Remove the background of this image and replace it with a flat pure green (#00FF00) screen. Keep the subject pixel-perfect."
        } else {
            "Remove the background of this image and make it fully transparent. Keep the subject pixel-perfect."
        };
        self.edit_image(image, instruction).await
    }

    async fn upscale_image(&self, image: &EncodedImage) -> Result<EncodedImage> {
        self.edit_image(image, UPSCALE_INSTRUCTION).await
    }

    async fn zoom_out_image(&self, image: &EncodedImage) -> Result<EncodedImage> {
        self.edit_image(image, ZOOM_OUT_INSTRUCTION).await
    }

    async fn analyze_image(&self, image: &EncodedImage) -> Result<String> {
        self.generate_text(vec![inline_part(image), json!({ "text": ANALYZE_INSTRUCTION })])
            .await
    }

    async fn editing_suggestion(&self, image: &EncodedImage) -> Result<EditingSuggestion> {
        let value = self
            .generate_json(
                vec![inline_part(image), json!({ "text": SUGGESTION_INSTRUCTION })],
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "analysis_prompt": { "type": "STRING" },
                        "suggestion": { "type": "STRING" },
                    },
                    "required": ["analysis_prompt", "suggestion"],
                }),
            )
            .await?;
        serde_json::from_value(value)
            .with_context(|| format!("{PROVIDER} suggestion payload missing fields"))
    }

    async fn batch_suggestions(&self, images: &[EncodedImage]) -> Result<Vec<String>> {
        let mut parts: Vec<Value> = images.iter().map(inline_part).collect();
        parts.push(json!({
            "text": format!(
                "For each of the {} images above, in order, write one short creative prompt addition (under 12 words) inspired by it.",
                images.len()
            ),
        }));
        let value = self
            .generate_json(
                parts,
                json!({ "type": "ARRAY", "items": { "type": "STRING" } }),
            )
            .await?;
        let suggestions: Vec<String> = serde_json::from_value(value)
            .with_context(|| format!("{PROVIDER} batch suggestions were not a string list"))?;
        Ok(suggestions.into_iter().take(images.len()).collect())
    }

    async fn optimize_prompt(&self, text: &str) -> Result<String> {
        self.generate_text(vec![json!({ "text": format!("{OPTIMIZE_INSTRUCTION}\n\n{text}") })])
            .await
            .map(|optimized| optimized.trim().to_string())
    }

    async fn inspire_prompt(&self) -> Result<String> {
        self.generate_text(vec![json!({ "text": INSPIRE_INSTRUCTION })])
            .await
            .map(|inspired| inspired.trim().to_string())
    }

    async fn generate_video(
        &self,
        params: &VeoParams,
        progress: &dyn ProgressSink,
    ) -> Result<VeoHistoryItem> {
        let mut instance = Map::new();
        instance.insert("prompt".to_string(), Value::String(params.prompt.clone()));
        if let Some(start) = params.start_frame.as_ref() {
            instance.insert("image".to_string(), video_frame(&start.data));
        }
        if let Some(end) = params.end_frame.as_ref() {
            instance.insert("lastFrame".to_string(), video_frame(&end.data));
        }
        let mut parameters = Map::new();
        parameters.insert("durationSeconds".to_string(), json!(params.duration_secs));
        if let Some(ratio) = params.aspect_ratio {
            parameters.insert("aspectRatio".to_string(), json!(ratio.as_str()));
        }

        let endpoint = self.endpoint_for_model(&self.config.video_model, "predictLongRunning");
        let started = self
            .post_json(
                &endpoint,
                &json!({ "instances": [instance], "parameters": parameters }),
            )
            .await?;
        let Some(operation) = started.get("name").and_then(Value::as_str) else {
            bail!("{PROVIDER} video request returned no operation name");
        };
        progress.progress("Video generation started, this can take a few minutes...");

        let operation_url = format!("{}/{}", self.config.api_base, operation);
        for poll in 1..=self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;
            let status = self.get_json(&operation_url).await?;
            if !status.get("done").and_then(Value::as_bool).unwrap_or(false) {
                let elapsed = self.config.poll_interval.as_secs() * u64::from(poll);
                progress.progress(&format!("Still rendering video ({elapsed}s elapsed)..."));
                continue;
            }
            if let Some(error) = status.get("error") {
                bail!("{PROVIDER} video generation failed: {error}");
            }
            let Some(uri) = extract_video_uri(&status) else {
                bail!("{PROVIDER} video operation finished without a video");
            };
            progress.progress("Video ready.");
            return Ok(VeoHistoryItem {
                id: Uuid::new_v4().to_string(),
                params: params.clone(),
                video: VideoRef {
                    uri,
                    mime_type: "video/mp4".to_string(),
                },
                created_at: chrono::Utc::now().to_rfc3339(),
            });
        }
        bail!(
            "{PROVIDER} video generation timed out after {} polls",
            self.config.max_polls
        )
    }
}

fn inline_part(image: &EncodedImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.to_base64(),
        }
    })
}

fn video_frame(image: &EncodedImage) -> Value {
    json!({
        "bytesBase64Encoded": image.to_base64(),
        "mimeType": image.mime_type,
    })
}

fn candidate_parts(payload: &Value) -> Vec<Value> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| {
            candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
        })
        .flatten()
        .cloned()
        .collect()
}

fn extract_images(payload: &Value) -> Result<Vec<EncodedImage>> {
    let mut out = Vec::new();
    for part in candidate_parts(payload) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .with_context(|| format!("{PROVIDER} image base64 decode failed"))?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        out.push(EncodedImage::new(bytes, mime_type));
    }
    Ok(out)
}

fn extract_text(payload: &Value) -> Option<String> {
    let text: String = candidate_parts(payload)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extract_video_uri(status: &Value) -> Option<String> {
    let response = status.get("response")?;
    let samples = response
        .get("generateVideoResponse")
        .and_then(|inner| inner.get("generatedSamples"))
        .or_else(|| response.get("generatedVideos"))
        .and_then(Value::as_array)?;
    samples
        .first()?
        .get("video")?
        .get("uri")?
        .as_str()
        .map(str::to_string)
}

async fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .with_context(|| format!("{PROVIDER} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{PROVIDER} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{PROVIDER} returned invalid JSON payload"))
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

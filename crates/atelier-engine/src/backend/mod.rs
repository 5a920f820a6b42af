mod dryrun;
mod gemini;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use atelier_contracts::media::{
    AspectRatio, EncodedImage, GeneratedImage, UploadedImage, VeoHistoryItem, VeoParams,
};
use serde::Deserialize;

use crate::config::{BackendKind, StudioConfig};

pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;

/// Receives human-readable progress lines from long-running backend calls.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, message: &str);
}

/// Sink that drops every message.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditingSuggestion {
    #[serde(alias = "analysis_prompt")]
    pub analysis: String,
    pub suggestion: String,
}

/// The generative media service. Every call is a suspension point and any
/// failure surfaces as an `anyhow::Error`.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_images(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[UploadedImage],
        count: usize,
    ) -> Result<Vec<GeneratedImage>>;

    async fn remove_background(&self, image: &EncodedImage, green_screen: bool)
        -> Result<EncodedImage>;

    async fn upscale_image(&self, image: &EncodedImage) -> Result<EncodedImage>;

    async fn zoom_out_image(&self, image: &EncodedImage) -> Result<EncodedImage>;

    async fn analyze_image(&self, image: &EncodedImage) -> Result<String>;

    async fn editing_suggestion(&self, image: &EncodedImage) -> Result<EditingSuggestion>;

    /// One short suggestion per input image, in input order.
    async fn batch_suggestions(&self, images: &[EncodedImage]) -> Result<Vec<String>>;

    async fn optimize_prompt(&self, text: &str) -> Result<String>;

    async fn inspire_prompt(&self) -> Result<String>;

    async fn generate_video(
        &self,
        params: &VeoParams,
        progress: &dyn ProgressSink,
    ) -> Result<VeoHistoryItem>;
}

pub fn build_backend(config: &StudioConfig) -> Result<Arc<dyn GenerativeBackend>> {
    match config.backend {
        BackendKind::Dryrun => Ok(Arc::new(DryrunBackend::new())),
        BackendKind::Gemini => Ok(Arc::new(GeminiBackend::new(config.gemini.clone())?)),
    }
}

//! Scripted backend for orchestrator tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use atelier_contracts::events::EventWriter;
use atelier_contracts::media::{
    AspectRatio, EncodedImage, GeneratedImage, UploadedImage, VeoHistoryItem, VeoParams, VideoRef,
};
use atelier_contracts::storage::{DurableStorage, MemoryStorage};
use tokio::sync::Notify;

use crate::busy::lock;
use crate::backend::{EditingSuggestion, GenerativeBackend, ProgressSink};
use crate::imaging::solid_png;
use crate::studio::Shared;
use crate::toast::ToastCenter;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub prompt: String,
    pub count: usize,
    pub references: Vec<UploadedImage>,
}

/// Held-open calls: the backend signals `entered` and waits on `release`.
#[derive(Clone)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    calls: Mutex<Vec<Call>>,
    generate_calls: AtomicUsize,
    failing_generates: Mutex<HashSet<usize>>,
    empty_generates: Mutex<HashSet<usize>>,
    fail_suggestions: AtomicBool,
    fail_background_removal: AtomicBool,
    fail_video: AtomicBool,
    gate: Mutex<Option<Gate>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `generate_images` calls at these zero-based positions.
    pub fn fail_generates(&self, indices: impl IntoIterator<Item = usize>) {
        lock(&self.failing_generates).extend(indices);
    }

    pub fn empty_generates(&self, indices: impl IntoIterator<Item = usize>) {
        lock(&self.empty_generates).extend(indices);
    }

    pub fn fail_suggestions(&self) {
        self.fail_suggestions.store(true, Ordering::SeqCst);
    }

    pub fn fail_background_removal(&self) {
        self.fail_background_removal.store(true, Ordering::SeqCst);
    }

    pub fn fail_video(&self) {
        self.fail_video.store(true, Ordering::SeqCst);
    }

    /// Makes image and video generation wait until the returned gate is released.
    pub fn gated(&self) -> Gate {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.op == op).collect()
    }

    fn log(&self, op: &'static str, prompt: &str, count: usize, references: &[UploadedImage]) {
        lock(&self.calls).push(Call {
            op,
            prompt: prompt.to_string(),
            count,
            references: references.to_vec(),
        });
    }

    async fn hold(&self) {
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_images(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
        references: &[UploadedImage],
        count: usize,
    ) -> Result<Vec<GeneratedImage>> {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.log("generate_images", prompt, count, references);
        self.hold().await;
        if lock(&self.failing_generates).contains(&call) {
            bail!("scripted failure for call {call}");
        }
        if lock(&self.empty_generates).contains(&call) {
            return Ok(Vec::new());
        }
        (0..count)
            .map(|idx| -> Result<GeneratedImage> {
                let data = solid_png(16, 9, [call as u8, idx as u8, 7])?;
                Ok(GeneratedImage::new(data, format!("scripted {call}-{idx}"), prompt))
            })
            .collect()
    }

    async fn remove_background(&self, image: &EncodedImage, green_screen: bool) -> Result<EncodedImage> {
        self.log("remove_background", &green_screen.to_string(), 1, &[]);
        if self.fail_background_removal.load(Ordering::SeqCst) {
            bail!("scripted background removal failure ({} bytes)", image.bytes.len());
        }
        solid_png(8, 8, [0, 255, 0])
    }

    async fn upscale_image(&self, _image: &EncodedImage) -> Result<EncodedImage> {
        self.log("upscale_image", "", 1, &[]);
        solid_png(32, 18, [1, 1, 1])
    }

    async fn zoom_out_image(&self, _image: &EncodedImage) -> Result<EncodedImage> {
        self.log("zoom_out_image", "", 1, &[]);
        solid_png(24, 24, [2, 2, 2])
    }

    async fn analyze_image(&self, _image: &EncodedImage) -> Result<String> {
        let n = lock(&self.calls).len();
        self.log("analyze_image", "", 1, &[]);
        Ok(format!("analysis {n}"))
    }

    async fn editing_suggestion(&self, _image: &EncodedImage) -> Result<EditingSuggestion> {
        self.log("editing_suggestion", "", 1, &[]);
        if self.fail_suggestions.load(Ordering::SeqCst) {
            bail!("scripted suggestion failure");
        }
        Ok(EditingSuggestion {
            analysis: "analysis of image".to_string(),
            suggestion: "suggestion for image".to_string(),
        })
    }

    async fn batch_suggestions(&self, images: &[EncodedImage]) -> Result<Vec<String>> {
        self.log("batch_suggestions", "", images.len(), &[]);
        if self.fail_suggestions.load(Ordering::SeqCst) {
            bail!("scripted suggestion failure");
        }
        Ok((1..=images.len()).map(|n| format!("chip {n}")).collect())
    }

    async fn optimize_prompt(&self, text: &str) -> Result<String> {
        self.log("optimize_prompt", text, 1, &[]);
        Ok(format!("optimized: {text}"))
    }

    async fn inspire_prompt(&self) -> Result<String> {
        let n = self.calls_to("inspire_prompt").len() + 1;
        self.log("inspire_prompt", "", 1, &[]);
        Ok(format!("inspired idea {n}"))
    }

    async fn generate_video(
        &self,
        params: &VeoParams,
        progress: &dyn ProgressSink,
    ) -> Result<VeoHistoryItem> {
        let n = self.calls_to("generate_video").len();
        self.log("generate_video", &params.prompt, 1, &[]);
        progress.progress("Rendering video...");
        self.hold().await;
        if self.fail_video.load(Ordering::SeqCst) {
            bail!("scripted video failure");
        }
        Ok(VeoHistoryItem {
            id: format!("video-{n}"),
            params: params.clone(),
            video: VideoRef {
                uri: format!("scripted://video/{n}"),
                mime_type: "video/mp4".to_string(),
            },
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

pub(crate) fn scripted_shared(backend: Arc<ScriptedBackend>) -> Shared {
    scripted_shared_with(backend, Arc::new(MemoryStorage::new()))
}

pub(crate) fn scripted_shared_with(
    backend: Arc<ScriptedBackend>,
    storage: Arc<dyn DurableStorage>,
) -> Shared {
    Shared::new(backend, storage, ToastCenter::new(), EventWriter::disabled("test"))
}

pub(crate) fn upload(name: &str) -> Result<UploadedImage> {
    Ok(UploadedImage::new(solid_png(4, 4, [9, 9, 9])?, name).with_dimensions(4, 4))
}

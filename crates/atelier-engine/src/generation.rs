//! Image generation orchestrator: single-unit and sequential batch dispatch,
//! plus the one-image effects that share its in-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use atelier_contracts::events::payload;
use atelier_contracts::media::{AspectRatio, EncodedImage, GeneratedImage, UploadedImage};
use serde::Serialize;
use serde_json::json;

use crate::busy::{lock, InFlight};
use crate::composer::ComposedScene;
use crate::error::{StudioError, StudioResult};
use crate::studio::Shared;

/// Variants requested by a plain single-unit dispatch.
pub const SINGLE_UNIT_VARIANTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum GenerationStatus {
    Complete,
    /// Some batch scenes failed; the rest were delivered and recorded.
    Partial { succeeded: usize, failed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub images: Vec<GeneratedImage>,
    pub status: GenerationStatus,
}

impl GenerationOutcome {
    pub fn is_partial(&self) -> bool {
        matches!(self.status, GenerationStatus::Partial { .. })
    }
}

/// A ready-to-send single-unit request.
#[derive(Debug, Clone)]
pub struct SingleUnit {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub references: Vec<UploadedImage>,
    pub count: usize,
}

/// A ready-to-send batch: one composed prompt per scene, shared references.
#[derive(Debug, Clone)]
pub struct SceneBatch {
    pub scenes: Vec<ComposedScene>,
    pub aspect_ratio: AspectRatio,
    pub references: Vec<UploadedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RemoveBackground { green_screen: bool },
    Upscale,
    ZoomOut,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::RemoveBackground { .. } => "remove_background",
            Effect::Upscale => "upscale",
            Effect::ZoomOut => "zoom_out",
        }
    }
}

/// Image an effect is applied to.
#[derive(Debug, Clone)]
pub struct EffectSource {
    pub data: EncodedImage,
    pub file_name: String,
    pub prompt: String,
}

/// Visible results plus the single in-flight flag shared by generation and effects.
#[derive(Debug, Default)]
pub struct ImageOrchestrator {
    in_flight: AtomicBool,
    results: Mutex<Vec<GeneratedImage>>,
}

impl ImageOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn results(&self) -> Vec<GeneratedImage> {
        lock(&self.results).clone()
    }

    /// One backend call; the returned set replaces the visible results and is
    /// committed to history as a group.
    pub(crate) async fn run_single(
        &self,
        shared: &Shared,
        unit: SingleUnit,
    ) -> StudioResult<GenerationOutcome> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        lock(&self.results).clear();
        shared.events.record(
            "generation_started",
            payload(json!({
                "kind": "single",
                "count": unit.count,
                "aspect_ratio": unit.aspect_ratio.as_str(),
                "references": unit.references.len(),
            })),
        );

        let generated = shared
            .backend
            .generate_images(&unit.prompt, unit.aspect_ratio, &unit.references, unit.count)
            .await;
        let images: Vec<GeneratedImage> = match generated {
            Ok(images) => images
                .into_iter()
                .map(|image| GeneratedImage {
                    prompt: unit.prompt.clone(),
                    aspect_ratio: Some(unit.aspect_ratio.as_str().to_string()),
                    ..image
                })
                .collect(),
            Err(err) => {
                shared.events.record(
                    "generation_failed",
                    payload(json!({ "kind": "single", "error": format!("{err:#}") })),
                );
                return Err(StudioError::Backend(err));
            }
        };

        *lock(&self.results) = images.clone();
        for image in &images {
            record_artifact(shared, image);
        }
        shared.commit(&images);
        shared.events.record(
            "generation_finished",
            payload(json!({ "kind": "single", "succeeded": images.len(), "failed": 0 })),
        );
        Ok(GenerationOutcome {
            images,
            status: GenerationStatus::Complete,
        })
    }

    /// Scenes run strictly one after another. A failed scene is reported and
    /// skipped; only a batch with no successes fails.
    pub(crate) async fn run_batch(
        &self,
        shared: &Shared,
        batch: SceneBatch,
    ) -> StudioResult<GenerationOutcome> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        lock(&self.results).clear();
        let attempted = batch.scenes.len();
        shared
            .toasts
            .info(format!("Preparing to generate {attempted} scenes..."));
        shared.events.record(
            "generation_started",
            payload(json!({
                "kind": "batch",
                "scenes": batch.scenes.iter().map(|scene| scene.scene.as_str()).collect::<Vec<_>>(),
                "aspect_ratio": batch.aspect_ratio.as_str(),
                "references": batch.references.len(),
            })),
        );

        let mut delivered = Vec::new();
        for scene in &batch.scenes {
            shared
                .toasts
                .info(format!("Generating scene: {}", scene.scene));
            let result = shared
                .backend
                .generate_images(&scene.prompt, batch.aspect_ratio, &batch.references, 1)
                .await;
            let first = match result {
                Ok(images) => images.into_iter().next(),
                Err(err) => {
                    scene_failed(shared, &scene.scene, &format!("{err:#}"));
                    continue;
                }
            };
            let Some(image) = first else {
                scene_failed(shared, &scene.scene, "no image returned");
                continue;
            };

            let image = GeneratedImage {
                alt: scene.alt.clone(),
                prompt: scene.prompt.clone(),
                aspect_ratio: Some(batch.aspect_ratio.as_str().to_string()),
                ..image
            };
            lock(&self.results).push(image.clone());
            record_artifact(shared, &image);
            shared.commit(std::slice::from_ref(&image));
            delivered.push(image);
        }

        let succeeded = delivered.len();
        let failed = attempted - succeeded;
        shared.events.record(
            "generation_finished",
            payload(json!({ "kind": "batch", "succeeded": succeeded, "failed": failed })),
        );
        if succeeded == 0 {
            return Err(StudioError::TotalBatchFailure { attempted });
        }
        shared
            .toasts
            .success(format!("Finished generating {succeeded} scenes!"));
        let status = if failed == 0 {
            GenerationStatus::Complete
        } else {
            GenerationStatus::Partial { succeeded, failed }
        };
        Ok(GenerationOutcome {
            images: delivered,
            status,
        })
    }

    pub(crate) async fn apply_effect(
        &self,
        shared: &Shared,
        effect: Effect,
        source: EffectSource,
    ) -> StudioResult<GeneratedImage> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        lock(&self.results).clear();

        let backend = &shared.backend;
        let output = match effect {
            Effect::RemoveBackground { green_screen } => {
                backend.remove_background(&source.data, green_screen).await
            }
            Effect::Upscale => backend.upscale_image(&source.data).await,
            Effect::ZoomOut => backend.zoom_out_image(&source.data).await,
        };
        let output = output.map_err(|err| {
            shared.events.record(
                "generation_failed",
                payload(json!({ "kind": effect.as_str(), "error": format!("{err:#}") })),
            );
            StudioError::Backend(err)
        })?;

        let image = match effect {
            Effect::RemoveBackground { green_screen } => GeneratedImage::new(
                output,
                format!("{} - background removed", source.file_name),
                format!("Remove background from original image, green screen: {green_screen}"),
            ),
            Effect::Upscale => GeneratedImage::new(output, "Upscaled image", "Upscaled image"),
            Effect::ZoomOut => GeneratedImage::new(output, "Zoomed out image", source.prompt),
        };
        *lock(&self.results) = vec![image.clone()];
        shared.commit(std::slice::from_ref(&image));
        shared.events.record(
            "effect_applied",
            payload(json!({ "effect": effect.as_str(), "image_id": image.id })),
        );
        Ok(image)
    }
}

fn record_artifact(shared: &Shared, image: &GeneratedImage) {
    shared.events.record(
        "artifact_created",
        payload(json!({
            "image_id": image.id,
            "alt": image.alt,
            "aspect_ratio": image.aspect_ratio,
        })),
    );
}

fn scene_failed(shared: &Shared, scene: &str, error: &str) {
    shared
        .toasts
        .error(format!("Scene '{scene}' failed: {error}"));
    shared.events.record(
        "scene_failed",
        payload(json!({ "scene": scene, "error": error })),
    );
}

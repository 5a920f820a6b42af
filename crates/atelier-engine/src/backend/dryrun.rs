use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use atelier_contracts::media::{
    AspectRatio, EncodedImage, GeneratedImage, UploadedImage, VeoHistoryItem, VeoParams, VideoRef,
};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{EditingSuggestion, GenerativeBackend, ProgressSink};
use crate::imaging::{decode, encode_png, solid_png, PLACEHOLDER_FILL};

/// Pixels per ratio unit for offline renders (16:9 -> 512x288).
const DRYRUN_SCALE: u32 = 32;

const INSPIRATIONS: &[&str] = &[
    "A lone courier crossing a flooded overpass at midnight, holograms flickering in the rain",
    "An old mechanic tuning a chrome arm in a cramped garage lit by a single neon tube",
    "Two rival netrunners meeting on a rooftop garden above the smog line",
    "A street food vendor serving noodles to off-duty security drones",
];

/// Offline backend: deterministic solid-colour renders and canned text.
#[derive(Debug, Default)]
pub struct DryrunBackend {
    inspirations: AtomicUsize,
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenerativeBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate_images(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[UploadedImage],
        count: usize,
    ) -> Result<Vec<GeneratedImage>> {
        let (w, h) = aspect_ratio.parts();
        let mut out = Vec::with_capacity(count);
        for idx in 0..count as u64 {
            let salt = idx + references.len() as u64;
            let data = solid_png(w * DRYRUN_SCALE, h * DRYRUN_SCALE, color_from_prompt(prompt, salt))?;
            let alt = format!("dryrun-{}", short_id(prompt, idx));
            out.push(GeneratedImage::new(data, alt, prompt));
        }
        Ok(out)
    }

    async fn remove_background(
        &self,
        image: &EncodedImage,
        green_screen: bool,
    ) -> Result<EncodedImage> {
        let mut rgba = decode(image)?.to_rgba8();
        let key = rgba.get_pixel(0, 0).0;
        let fill = if green_screen {
            Rgba([0, 255, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
        for pixel in rgba.pixels_mut() {
            if pixel.0 == key {
                *pixel = fill;
            }
        }
        encode_png(&DynamicImage::ImageRgba8(rgba))
    }

    async fn upscale_image(&self, image: &EncodedImage) -> Result<EncodedImage> {
        let source = decode(image)?;
        let scaled = source.resize_exact(source.width() * 2, source.height() * 2, FilterType::Triangle);
        encode_png(&scaled)
    }

    async fn zoom_out_image(&self, image: &EncodedImage) -> Result<EncodedImage> {
        let source = decode(image)?.to_rgba8();
        let (width, height) = source.dimensions();
        let [r, g, b] = PLACEHOLDER_FILL;
        let mut canvas = RgbaImage::from_pixel(width + width / 2, height + height / 2, Rgba([r, g, b, 255]));
        imageops::overlay(&mut canvas, &source, i64::from(width / 4), i64::from(height / 4));
        encode_png(&DynamicImage::ImageRgba8(canvas))
    }

    async fn analyze_image(&self, image: &EncodedImage) -> Result<String> {
        let (width, height, hex) = describe(image)?;
        Ok(format!(
            "A {width}x{height} frame dominated by #{hex} tones with an even, flat exposure."
        ))
    }

    async fn editing_suggestion(&self, image: &EncodedImage) -> Result<EditingSuggestion> {
        let (width, height, hex) = describe(image)?;
        Ok(EditingSuggestion {
            analysis: format!("A {width}x{height} image washed in #{hex}."),
            suggestion: format!("Add neon rim light that contrasts with the #{hex} palette."),
        })
    }

    async fn batch_suggestions(&self, images: &[EncodedImage]) -> Result<Vec<String>> {
        images
            .iter()
            .map(|image| {
                let (_, _, hex) = describe(image)?;
                Ok(format!("accent with #{hex} highlights"))
            })
            .collect()
    }

    async fn optimize_prompt(&self, text: &str) -> Result<String> {
        Ok(format!(
            "{}, cinematic composition, detailed lighting, sharp focus",
            text.trim()
        ))
    }

    async fn inspire_prompt(&self) -> Result<String> {
        let idx = self.inspirations.fetch_add(1, Ordering::Relaxed);
        Ok(INSPIRATIONS[idx % INSPIRATIONS.len()].to_string())
    }

    async fn generate_video(
        &self,
        params: &VeoParams,
        progress: &dyn ProgressSink,
    ) -> Result<VeoHistoryItem> {
        progress.progress("Submitting video request...");
        progress.progress("Rendering video frames...");
        let id = short_id(&params.prompt, u64::from(params.duration_secs));
        progress.progress("Video ready.");
        Ok(VeoHistoryItem {
            id: Uuid::new_v4().to_string(),
            params: params.clone(),
            video: VideoRef {
                uri: format!("dryrun://video/{id}"),
                mime_type: "video/mp4".to_string(),
            },
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn describe(image: &EncodedImage) -> Result<(u32, u32, String)> {
    let rgb = decode(image)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let center = rgb.get_pixel(width / 2, height / 2).0;
    Ok((width, height, hex::encode(center)))
}

fn color_from_prompt(prompt: &str, seed: u64) -> [u8; 3] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2]]
}

fn short_id(prompt: &str, idx: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

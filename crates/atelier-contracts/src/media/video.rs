use serde::{Deserialize, Serialize};

use super::aspect::VideoAspectRatio;
use super::image::UploadedImage;

pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 5;

/// Everything needed to (re)dispatch one video generation.
#[derive(Debug, Clone, PartialEq)]
pub struct VeoParams {
    pub prompt: String,
    pub start_frame: Option<UploadedImage>,
    pub end_frame: Option<UploadedImage>,
    pub aspect_ratio: Option<VideoAspectRatio>,
    pub duration_secs: u32,
}

impl VeoParams {
    pub fn text(prompt: impl Into<String>, aspect_ratio: VideoAspectRatio) -> Self {
        Self {
            prompt: prompt.into(),
            start_frame: None,
            end_frame: None,
            aspect_ratio: Some(aspect_ratio),
            duration_secs: DEFAULT_VIDEO_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub uri: String,
    pub mime_type: String,
}

/// A finished video together with the parameters that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct VeoHistoryItem {
    pub id: String,
    pub params: VeoParams,
    pub video: VideoRef,
    pub created_at: String,
}

impl VeoHistoryItem {
    pub fn prompt(&self) -> &str {
        &self.params.prompt
    }
}

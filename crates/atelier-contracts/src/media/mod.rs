mod aspect;
mod image;
mod video;

pub use aspect::{ratio_label, AspectRatio, UnknownAspectRatio, VideoAspectRatio};
pub use image::{EncodedImage, GeneratedImage, HistoryItem, UploadedImage, DEFAULT_IMAGE_MIME};
pub use video::{VeoHistoryItem, VeoParams, VideoRef, DEFAULT_VIDEO_DURATION_SECS};

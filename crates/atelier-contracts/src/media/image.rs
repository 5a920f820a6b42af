use std::fmt;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Encoded image payload; serialized as a `data:` URL.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, DEFAULT_IMAGE_MIME)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn from_data_url(raw: &str) -> anyhow::Result<Self> {
        let Some(rest) = raw.strip_prefix("data:") else {
            bail!("image source is not a data URL");
        };
        let Some((header, data)) = rest.split_once(',') else {
            bail!("data URL is missing its payload separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("data URL payload is not base64 encoded");
        };
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .context("data URL base64 decode failed")?;
        let mime_type = if mime_type.is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            mime_type
        };
        Ok(Self::new(bytes, mime_type))
    }

    /// Payload size of the encoded image in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DataUrlVisitor;

        impl Visitor<'_> for DataUrlVisitor {
            type Value = EncodedImage;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base64 data URL")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                EncodedImage::from_data_url(value).map_err(|err| E::custom(format!("{err:#}")))
            }
        }

        deserializer.deserialize_str(DataUrlVisitor)
    }
}

/// An image held by one draft slot (reference, character, frame, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub id: String,
    pub data: EncodedImage,
    pub file_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Auto-generated neutral fill that only pins the output aspect ratio.
    pub is_placeholder: bool,
    /// Background removal still running for this image.
    pub processing: bool,
    pub has_error: bool,
}

impl UploadedImage {
    pub fn new(data: EncodedImage, file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            file_name: file_name.into(),
            width: None,
            height: None,
            is_placeholder: false,
            processing: false,
            has_error: false,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn placeholder(data: EncodedImage, width: u32, height: u32, file_name: String) -> Self {
        Self {
            is_placeholder: true,
            ..Self::new(data, file_name).with_dimensions(width, height)
        }
    }

    pub fn from_generated(image: &GeneratedImage, file_name: impl Into<String>) -> Self {
        Self {
            width: image.width,
            height: image.height,
            ..Self::new(image.data.clone(), file_name)
        }
    }
}

/// A successful backend result. Only the enrichment fields change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    #[serde(rename = "src")]
    pub data: EncodedImage,
    pub alt: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl GeneratedImage {
    pub fn new(data: EncodedImage, alt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            alt: alt.into(),
            prompt: prompt.into(),
            aspect_ratio: None,
            width: None,
            height: None,
            size: None,
        }
    }
}

/// A generated image committed to the durable history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    #[serde(rename = "src")]
    pub data: EncodedImage,
    pub alt: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl HistoryItem {
    pub fn to_generated(&self) -> GeneratedImage {
        GeneratedImage {
            id: self.id.clone(),
            data: self.data.clone(),
            alt: self.alt.clone(),
            prompt: self.prompt.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            width: self.width,
            height: self.height,
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn data_url_roundtrip_keeps_mime_and_bytes() -> anyhow::Result<()> {
        let image = EncodedImage::new(vec![1, 2, 3, 250], "image/jpeg");
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(EncodedImage::from_data_url(&url)?, image);
        Ok(())
    }

    #[test]
    fn data_url_rejects_non_base64_sources() {
        assert!(EncodedImage::from_data_url("https://example.com/a.png").is_err());
        assert!(EncodedImage::from_data_url("data:image/png,raw").is_err());
    }

    #[test]
    fn history_item_uses_camel_case_and_src_field() -> anyhow::Result<()> {
        let item = HistoryItem {
            id: "h1".to_string(),
            data: EncodedImage::png(vec![7; 4]),
            alt: "alt".to_string(),
            prompt: "neon alley".to_string(),
            aspect_ratio: Some("16:9".to_string()),
            width: Some(1600),
            height: Some(900),
            size: Some(4),
            analysis: None,
            created_at: None,
        };
        let value = serde_json::to_value(&item)?;
        assert_eq!(value["aspectRatio"], json!("16:9"));
        assert_eq!(value["analysis"], Value::Null);
        assert!(value["src"]
            .as_str()
            .unwrap_or_default()
            .starts_with("data:image/png;base64,"));

        let parsed: HistoryItem = serde_json::from_value(value)?;
        assert_eq!(parsed, item);
        Ok(())
    }

    #[test]
    fn history_item_tolerates_missing_metadata() -> anyhow::Result<()> {
        let parsed: HistoryItem = serde_json::from_value(json!({
            "id": "h2",
            "src": EncodedImage::png(vec![1]).to_data_url(),
            "alt": "",
            "prompt": "p",
        }))?;
        assert_eq!(parsed.width, None);
        assert_eq!(parsed.aspect_ratio, None);
        Ok(())
    }
}

use std::sync::Arc;

use atelier_contracts::events::{payload, EventWriter};
use atelier_contracts::media::{ratio_label, GeneratedImage, HistoryItem};
use atelier_contracts::storage::{DurableStorage, StorageError};
use serde_json::{json, Value};

use crate::imaging;
use crate::toast::ToastCenter;

pub const HISTORY_CAP: usize = 25;
pub const HISTORY_KEY: &str = "image-gen-history";

pub const STORAGE_FULL_WARNING: &str =
    "Storage is full! History could not be saved automatically; delete some history entries manually.";

/// Newest-first list of committed results, written through to durable storage
/// on every mutation.
pub struct HistoryStore {
    items: Vec<HistoryItem>,
    storage: Arc<dyn DurableStorage>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            items: Vec::new(),
            storage,
        }
    }

    /// Loads whatever was persisted, as stored. Entries that no longer parse
    /// are skipped; a missing or corrupt record yields an empty list.
    pub fn load(storage: Arc<dyn DurableStorage>) -> Self {
        let items = storage
            .read(HISTORY_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Vec<Value>>(&raw).ok())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| serde_json::from_value::<HistoryItem>(row).ok())
            .collect();
        Self { items, storage }
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Prepends `images` (keeping their order), truncates to [`HISTORY_CAP`]
    /// and persists. The in-memory list is updated even when the write fails.
    pub fn commit(&mut self, images: &[GeneratedImage]) -> Result<(), StorageError> {
        let mut next: Vec<HistoryItem> = images.iter().map(enrich).collect();
        next.append(&mut self.items);
        next.truncate(HISTORY_CAP);
        self.items = next;
        self.persist()
    }

    /// Stores an analysis once; later calls for the same item are ignored.
    pub fn set_analysis(&mut self, id: &str, analysis: String) -> Result<bool, StorageError> {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return Ok(false);
        };
        if item.analysis.is_some() {
            return Ok(false);
        }
        item.analysis = Some(analysis);
        self.persist()?;
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.items.retain(|item| item.id != id);
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.items.clear();
        self.persist()
    }

    fn persist(&self) -> Result<(), StorageError> {
        let keep = &self.items[..self.items.len().min(HISTORY_CAP)];
        let raw = serde_json::to_string(keep).map_err(|source| StorageError::Encode {
            key: HISTORY_KEY.to_string(),
            source,
        })?;
        self.storage.write(HISTORY_KEY, &raw)
    }
}

/// Fills dimensions, byte size and aspect ratio from the encoded payload.
/// Undecodable images keep whatever metadata they already carried.
pub fn enrich(image: &GeneratedImage) -> HistoryItem {
    let mut item = HistoryItem {
        id: image.id.clone(),
        data: image.data.clone(),
        alt: image.alt.clone(),
        prompt: image.prompt.clone(),
        aspect_ratio: image.aspect_ratio.clone(),
        width: image.width,
        height: image.height,
        size: image.size,
        analysis: None,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
    };
    if let Some((width, height)) = imaging::dimensions(&image.data) {
        item.width = Some(width);
        item.height = Some(height);
        item.size = Some(image.data.size());
        if item.aspect_ratio.is_none() {
            item.aspect_ratio = ratio_label(width, height);
        }
    }
    item
}

/// Routes a failed history write to the warning channel; never fails the caller.
pub(crate) fn report_persist_failure(err: &StorageError, toasts: &ToastCenter, events: &EventWriter) {
    if err.is_quota() {
        toasts.error(STORAGE_FULL_WARNING);
    } else {
        toasts.error(format!("Saving history failed: {err}"));
    }
    events.record(
        "history_persist_failed",
        payload(json!({
            "key": HISTORY_KEY,
            "quota": err.is_quota(),
            "error": err.to_string(),
        })),
    );
}

#[cfg(test)]
mod tests {
    use atelier_contracts::media::EncodedImage;
    use atelier_contracts::storage::MemoryStorage;

    use super::*;
    use crate::imaging::solid_png;

    fn generated(label: &str) -> anyhow::Result<GeneratedImage> {
        Ok(GeneratedImage::new(solid_png(32, 18, [1, 2, 3])?, label, label))
    }

    #[test]
    fn commit_enriches_and_keeps_newest_first() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let mut history = HistoryStore::new(storage.clone());
        history.commit(&[generated("a")?])?;
        history.commit(&[generated("b")?, generated("c")?])?;

        let alts: Vec<&str> = history.items().iter().map(|item| item.alt.as_str()).collect();
        assert_eq!(alts, vec!["b", "c", "a"]);
        let first = &history.items()[0];
        assert_eq!((first.width, first.height), (Some(32), Some(18)));
        assert_eq!(first.aspect_ratio.as_deref(), Some("16:9"));
        assert!(first.size.is_some_and(|size| size > 0));
        assert_eq!(first.analysis, None);

        let reloaded = HistoryStore::load(storage);
        assert_eq!(reloaded.items(), history.items());
        Ok(())
    }

    #[test]
    fn history_never_exceeds_cap() -> anyhow::Result<()> {
        let mut history = HistoryStore::new(Arc::new(MemoryStorage::new()));
        for idx in 0..30 {
            history.commit(&[generated(&format!("img-{idx}"))?])?;
            assert!(history.len() <= HISTORY_CAP);
        }
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history.items()[0].alt, "img-29");
        assert_eq!(history.items()[HISTORY_CAP - 1].alt, "img-5");
        Ok(())
    }

    #[test]
    fn supplied_ratio_wins_and_bad_bytes_are_kept() -> anyhow::Result<()> {
        let mut history = HistoryStore::new(Arc::new(MemoryStorage::new()));
        let mut tagged = generated("tagged")?;
        tagged.aspect_ratio = Some("4:3".to_string());
        let broken = GeneratedImage::new(EncodedImage::png(vec![9, 9, 9]), "broken", "p");
        history.commit(&[tagged, broken])?;

        assert_eq!(history.items()[0].aspect_ratio.as_deref(), Some("4:3"));
        let kept = &history.items()[1];
        assert_eq!(kept.alt, "broken");
        assert_eq!((kept.width, kept.height, kept.size), (None, None, None));
        Ok(())
    }

    #[test]
    fn quota_rejection_keeps_memory_state() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::with_quota(64));
        let mut history = HistoryStore::new(storage.clone());
        let err = history.commit(&[generated("big")?]).err();
        assert!(err.as_ref().is_some_and(StorageError::is_quota));
        assert_eq!(history.len(), 1);
        assert_eq!(storage.read(HISTORY_KEY)?, None);
        Ok(())
    }

    #[test]
    fn load_is_verbatim_and_skips_bad_rows() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let src = EncodedImage::png(vec![1]).to_data_url();
        let rows: Vec<Value> = (0..30)
            .map(|idx| json!({ "id": format!("h{idx}"), "src": src, "alt": "", "prompt": "p" }))
            .chain([json!({ "id": "bad" })])
            .collect();
        storage.write(HISTORY_KEY, &serde_json::to_string(&rows)?)?;

        let history = HistoryStore::load(storage.clone());
        assert_eq!(history.len(), 30);
        assert!(history.get("bad").is_none());

        storage.write(HISTORY_KEY, "not json")?;
        assert!(HistoryStore::load(storage).is_empty());
        Ok(())
    }

    #[test]
    fn analysis_is_set_once_and_delete_clear_persist() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let mut history = HistoryStore::new(storage.clone());
        let image = generated("x")?;
        let id = image.id.clone();
        history.commit(&[image, generated("y")?])?;

        assert!(history.set_analysis(&id, "first".to_string())?);
        assert!(!history.set_analysis(&id, "second".to_string())?);
        assert_eq!(history.get(&id).and_then(|item| item.analysis.as_deref()), Some("first"));

        history.delete(&id)?;
        assert_eq!(HistoryStore::load(storage.clone()).len(), 1);
        history.clear()?;
        assert!(HistoryStore::load(storage).is_empty());
        Ok(())
    }
}

//! Video generation orchestrator and its in-memory history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use atelier_contracts::catalog::PromptCatalog;
use atelier_contracts::events::payload;
use atelier_contracts::media::{VeoHistoryItem, VeoParams};
use atelier_contracts::random::RandomSource;
use serde_json::json;

use crate::busy::{self, InFlight};
use crate::error::{InputError, StudioError, StudioResult};
use crate::session::VideoDraft;
use crate::studio::Shared;

/// Builds dispatchable parameters from the draft: the raw prompt and ratio
/// are checked first, then the director clause is appended.
pub fn compose_video(
    draft: &VideoDraft,
    catalog: &PromptCatalog,
    rng: &mut dyn RandomSource,
) -> StudioResult<VeoParams> {
    if draft.prompt.trim().is_empty() {
        return Err(InputError::MissingVideoPrompt.into());
    }
    if draft.aspect_ratio.is_none() {
        return Err(InputError::MissingVideoAspectRatio.into());
    }
    let director = draft
        .director
        .resolve(catalog, rng)
        .map(|selection| selection.style.prompt)
        .unwrap_or_default();
    let mut params = draft.to_params();
    params.prompt = format!("{} {director}", draft.prompt).trim().to_string();
    Ok(params)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoState {
    /// Newest first.
    pub history: Vec<VeoHistoryItem>,
    pub displayed: Option<VeoHistoryItem>,
    pub last_success: Option<VeoParams>,
}

impl VideoState {
    /// Parameters regenerate and restore act on: the displayed unit first,
    /// then the last success.
    pub fn preferred(&self) -> Option<&VeoParams> {
        self.displayed
            .as_ref()
            .map(|item| &item.params)
            .or(self.last_success.as_ref())
    }

    /// Removes `id`. When it is on display the display moves to the entry
    /// just before it, or to the one after it when `id` was first. The
    /// display is only cleared once the history is empty.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(index) = self.history.iter().position(|item| item.id == id) else {
            return false;
        };
        if self.displayed.as_ref().is_some_and(|item| item.id == id) {
            let neighbour = match index {
                0 => self.history.get(1),
                _ => self.history.get(index - 1),
            };
            self.displayed = neighbour.cloned();
        }
        self.history.remove(index);
        true
    }
}

#[derive(Debug, Default)]
pub struct VideoOrchestrator {
    in_flight: AtomicBool,
    state: Mutex<VideoState>,
}

impl VideoOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> VideoState {
        self.lock().clone()
    }

    pub fn history(&self) -> Vec<VeoHistoryItem> {
        self.lock().history.clone()
    }

    pub fn displayed(&self) -> Option<VeoHistoryItem> {
        self.lock().displayed.clone()
    }

    /// Sends `params` as-is. Progress lines surface as info toasts.
    pub(crate) async fn dispatch(
        &self,
        shared: &Shared,
        params: VeoParams,
    ) -> StudioResult<VeoHistoryItem> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let result = shared
            .backend
            .generate_video(&params, &shared.toasts)
            .await;
        let item = match result {
            Ok(item) => VeoHistoryItem {
                params: params.clone(),
                ..item
            },
            Err(err) => {
                shared.events.record(
                    "video_failed",
                    payload(json!({ "error": format!("{err:#}") })),
                );
                return Err(StudioError::Backend(err));
            }
        };

        {
            let mut state = self.lock();
            state.history.insert(0, item.clone());
            state.displayed = Some(item.clone());
            state.last_success = Some(params);
        }
        shared.toasts.success("Video generated!");
        shared.events.record(
            "video_created",
            payload(json!({
                "video_id": item.id,
                "uri": item.video.uri,
                "aspect_ratio": item.params.aspect_ratio.map(|ratio| ratio.as_str()),
                "duration_secs": item.params.duration_secs,
            })),
        );
        Ok(item)
    }

    pub fn regenerate_params(&self) -> StudioResult<VeoParams> {
        self.lock()
            .preferred()
            .cloned()
            .ok_or(StudioError::Input(InputError::NothingToRegenerate))
    }

    /// Copies the preferred parameters back into the draft.
    pub fn restore_into(&self, draft: &mut VideoDraft) -> StudioResult<()> {
        let params = self
            .lock()
            .preferred()
            .cloned()
            .ok_or(StudioError::Input(InputError::NothingToRestore))?;
        draft.restore_from(&params);
        Ok(())
    }

    /// Keeps only the displayed unit's text: frames are dropped and the
    /// display is cleared.
    pub fn use_text_into(&self, draft: &mut VideoDraft) -> StudioResult<()> {
        let mut state = self.lock();
        let item = state
            .displayed
            .take()
            .ok_or(StudioError::Input(InputError::NothingToRestore))?;
        draft.prompt = item.params.prompt;
        draft.start_frame = None;
        draft.end_frame = None;
        Ok(())
    }

    pub(crate) fn delete(&self, shared: &Shared, id: &str) -> StudioResult<()> {
        if !self.lock().delete(id) {
            return Err(StudioError::UnknownHistoryItem(id.to_string()));
        }
        shared
            .events
            .record("video_deleted", payload(json!({ "video_id": id })));
        Ok(())
    }

    pub fn play(&self, id: &str) -> StudioResult<VeoHistoryItem> {
        let mut state = self.lock();
        let item = state
            .history
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| StudioError::UnknownHistoryItem(id.to_string()))?;
        state.displayed = Some(item.clone());
        Ok(item)
    }

    fn lock(&self) -> MutexGuard<'_, VideoState> {
        busy::lock(&self.state)
    }
}

//! Advisor merge engine: turns image uploads into prompt suggestions and
//! merges the user's pick back into a draft prompt.

use std::sync::Mutex;

use atelier_contracts::events::payload;
use atelier_contracts::media::EncodedImage;
use serde::Serialize;
use serde_json::json;

use crate::busy::lock;
use crate::session::{PromptSlot, Session};
use crate::studio::Shared;

pub const APPLIED_MESSAGE: &str = "AI suggestion applied!";

/// An analysis/suggestion pair waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionContext {
    pub analysis: String,
    pub suggestion: String,
    pub target: PromptSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Analysis,
    Suggestion,
    Both,
    Dismiss,
}

impl SuggestionContext {
    /// Text adopted for `resolution`; `None` on dismissal.
    pub fn content(&self, resolution: Resolution) -> Option<String> {
        match resolution {
            Resolution::Analysis => Some(self.analysis.clone()),
            Resolution::Suggestion => Some(self.suggestion.clone()),
            Resolution::Both => Some(format!("{}\n\n{}", self.analysis, self.suggestion)),
            Resolution::Dismiss => None,
        }
        .filter(|text| !text.is_empty())
    }
}

/// Short single-use suggestion produced by a multi-image upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chip {
    pub text: String,
    pub target: PromptSlot,
}

/// Appends `addition` as a new paragraph.
pub fn append_block(prompt: &mut String, addition: &str) {
    let current = prompt.trim_end();
    *prompt = if current.is_empty() {
        addition.to_string()
    } else {
        format!("{current}\n\n{addition}")
    };
}

/// Appends `addition` to the same line, comma separated.
pub fn append_inline(prompt: &mut String, addition: &str) {
    let current = prompt.trim_end();
    *prompt = if current.is_empty() {
        addition.to_string()
    } else {
        format!("{current}, {addition}")
    };
}

/// Pending suggestion plus outstanding chips. Requests made here never look
/// at the orchestrators' in-flight flags.
#[derive(Debug, Default)]
pub struct Advisor {
    pending: Mutex<Option<SuggestionContext>>,
    chips: Mutex<Vec<Chip>>,
}

impl Advisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<SuggestionContext> {
        lock(&self.pending).clone()
    }

    pub fn chips(&self) -> Vec<Chip> {
        lock(&self.chips).clone()
    }

    pub fn clear_chips(&self) {
        lock(&self.chips).clear();
    }

    /// Asks for an analysis/suggestion pair on `image`. Any earlier pending
    /// pair is dropped first; failures become an error toast.
    pub(crate) async fn request_suggestion(
        &self,
        shared: &Shared,
        image: &EncodedImage,
        target: PromptSlot,
    ) -> Option<SuggestionContext> {
        lock(&self.pending).take();
        match shared.backend.editing_suggestion(image).await {
            Ok(pair) => {
                let context = SuggestionContext {
                    analysis: pair.analysis,
                    suggestion: pair.suggestion,
                    target,
                };
                *lock(&self.pending) = Some(context.clone());
                shared.events.record(
                    "advisor_suggestion",
                    payload(json!({ "kind": "single", "target": target })),
                );
                Some(context)
            }
            Err(err) => {
                shared
                    .toasts
                    .error(format!("Fetching suggestions failed: {err:#}"));
                shared.events.record(
                    "advisor_failed",
                    payload(json!({ "kind": "single", "error": format!("{err:#}") })),
                );
                None
            }
        }
    }

    /// Replaces the chips with one suggestion per image.
    pub(crate) async fn request_chips(
        &self,
        shared: &Shared,
        images: &[EncodedImage],
        target: PromptSlot,
    ) -> usize {
        self.clear_chips();
        match shared.backend.batch_suggestions(images).await {
            Ok(texts) => {
                let chips: Vec<Chip> = texts
                    .into_iter()
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| Chip { text, target })
                    .collect();
                let count = chips.len();
                *lock(&self.chips) = chips;
                shared.events.record(
                    "advisor_suggestion",
                    payload(json!({ "kind": "batch", "target": target, "chips": count })),
                );
                count
            }
            Err(err) => {
                shared
                    .toasts
                    .error(format!("Fetching batch suggestions failed: {err:#}"));
                shared.events.record(
                    "advisor_failed",
                    payload(json!({ "kind": "batch", "error": format!("{err:#}") })),
                );
                0
            }
        }
    }

    /// Closes the pending pair, merging the chosen text into its target slot.
    /// Returns the slot that changed, if any.
    pub fn resolve(&self, session: &mut Session, resolution: Resolution) -> Option<PromptSlot> {
        let context = lock(&self.pending).take()?;
        let content = context.content(resolution)?;
        append_block(session.prompt_mut(context.target), &content);
        Some(context.target)
    }

    /// Uses one chip and discards the rest.
    pub fn take_chip(&self, session: &mut Session, index: usize) -> Option<Chip> {
        let mut chips = lock(&self.chips);
        let chip = chips.get(index).cloned()?;
        chips.clear();
        drop(chips);
        append_inline(session.prompt_mut(chip.target), &chip.text);
        Some(chip)
    }
}

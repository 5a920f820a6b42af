//! The `Studio`: one editing session wired to a backend, durable storage and
//! the event log.

use std::sync::{Arc, Mutex, MutexGuard};

use atelier_contracts::catalog::{DirectorChoice, MissionChoice, PromptCatalog};
use atelier_contracts::events::{payload, EventWriter};
use atelier_contracts::media::{
    AspectRatio, EncodedImage, GeneratedImage, HistoryItem, UploadedImage, VeoHistoryItem,
};
use atelier_contracts::preferences::{PreferenceStore, Theme};
use atelier_contracts::random::{sample_distinct, EntropyRandom, RandomSource};
use atelier_contracts::storage::{DurableStorage, StorageError};
use serde_json::json;

use crate::advisor::{Advisor, Chip, Resolution, SuggestionContext, APPLIED_MESSAGE};
use crate::backend::GenerativeBackend;
use crate::busy::lock;
use crate::composer::{
    compose_override, compose_simple, is_structured_prompt, with_cinematic, PromptComposer,
};
use crate::error::{InputError, StudioError, StudioResult};
use crate::generation::{
    Effect, EffectSource, GenerationOutcome, ImageOrchestrator, SceneBatch, SingleUnit,
    SINGLE_UNIT_VARIANTS,
};
use crate::history::{report_persist_failure, HistoryStore};
use crate::imaging;
use crate::session::{push_custom_images, Mode, PromptSlot, SceneDraft, Session, VideoFrame};
use crate::toast::ToastCenter;
use crate::video::{compose_video, VideoOrchestrator, VideoState};

pub const RANDOM_SCENE_COUNT: usize = 5;

/// Services every orchestrator reaches through: backend, history, toasts, log.
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn GenerativeBackend>,
    pub(crate) toasts: ToastCenter,
    pub(crate) events: EventWriter,
    history: Mutex<HistoryStore>,
}

impl Shared {
    pub(crate) fn new(
        backend: Arc<dyn GenerativeBackend>,
        storage: Arc<dyn DurableStorage>,
        toasts: ToastCenter,
        events: EventWriter,
    ) -> Self {
        Self {
            backend,
            toasts,
            events,
            history: Mutex::new(HistoryStore::load(storage)),
        }
    }

    pub(crate) fn history(&self) -> MutexGuard<'_, HistoryStore> {
        lock(&self.history)
    }

    /// Records `images` in history. A failed write only warns.
    pub(crate) fn commit(&self, images: &[GeneratedImage]) {
        let result = self.history().commit(images);
        self.degrade(result);
    }

    fn degrade(&self, result: Result<(), StorageError>) {
        if let Err(err) = result {
            report_persist_failure(&err, &self.toasts, &self.events);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomKind {
    Weapon,
    Companion,
}

impl CustomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CustomKind::Weapon => "weapon",
            CustomKind::Companion => "companion",
        }
    }
}

/// Where a generated or historical image is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseTarget {
    Reference,
    Character,
    RemoveBackground,
    DrawBackground,
}

enum Prepared {
    Single(SingleUnit),
    Batch(SceneBatch),
}

pub struct Studio {
    shared: Shared,
    preferences: PreferenceStore,
    catalog: PromptCatalog,
    rng: Mutex<Box<dyn RandomSource>>,
    session: Mutex<Session>,
    advisor: Advisor,
    images: ImageOrchestrator,
    videos: VideoOrchestrator,
}

impl Studio {
    /// Loads persisted history and starts with empty drafts in generate mode.
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        storage: Arc<dyn DurableStorage>,
        events: EventWriter,
    ) -> Self {
        let shared = Shared::new(backend, storage.clone(), ToastCenter::new(), events);
        shared.events.record(
            "studio_started",
            payload(json!({
                "backend": shared.backend.name(),
                "history": shared.history().len(),
            })),
        );
        Self {
            shared,
            preferences: PreferenceStore::new(storage),
            catalog: PromptCatalog::default(),
            rng: Mutex::new(Box::new(EntropyRandom::new())),
            session: Mutex::new(Session::default()),
            advisor: Advisor::new(),
            images: ImageOrchestrator::new(),
            videos: VideoOrchestrator::new(),
        }
    }

    pub fn with_toasts(mut self, toasts: ToastCenter) -> Self {
        self.shared.toasts = toasts;
        self
    }

    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn with_catalog(mut self, catalog: PromptCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.shared.backend.name()
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn toasts(&self) -> &ToastCenter {
        &self.shared.toasts
    }

    pub fn events(&self) -> &EventWriter {
        &self.shared.events
    }

    // -- mode and drafts ----------------------------------------------------

    pub fn session(&self) -> Session {
        self.lock_session().clone()
    }

    /// Runs `edit` against the live session.
    pub fn with_session<R>(&self, edit: impl FnOnce(&mut Session) -> R) -> R {
        edit(&mut self.lock_session())
    }

    pub fn mode(&self) -> Mode {
        self.lock_session().mode
    }

    pub fn switch_mode(&self, mode: Mode) {
        self.lock_session().switch_mode(mode);
    }

    pub fn select_aspect_ratio(&self, ratio: AspectRatio) -> StudioResult<()> {
        let placeholder = imaging::placeholder_for(ratio).map_err(StudioError::Imaging)?;
        self.lock_session().select_aspect_ratio(ratio, placeholder);
        Ok(())
    }

    pub fn clear_settings(&self) {
        let mode = {
            let mut session = self.lock_session();
            session.clear_current();
            session.mode
        };
        if matches!(mode, Mode::Generate | Mode::StructuredScene) {
            self.advisor.clear_chips();
        }
        self.shared.toasts.info("Settings cleared");
    }

    // -- uploads and the advisor --------------------------------------------

    /// Adds flat-mode references. One upload asks for a suggestion pair,
    /// several ask for chips.
    pub async fn upload_references(&self, incoming: Vec<UploadedImage>) {
        let uploads: Vec<UploadedImage> = incoming
            .into_iter()
            .filter(|image| !image.is_placeholder)
            .collect();
        self.lock_session()
            .generate
            .references
            .upload(uploads.iter().cloned());
        self.advisor.clear_chips();
        self.advise_uploads(&uploads, PromptSlot::Generate).await;
    }

    pub async fn set_character_image(&self, image: Option<UploadedImage>) {
        self.lock_session().scene.character = image.clone();
        self.advise_single(image.as_ref(), PromptSlot::Scene).await;
    }

    pub async fn set_removal_image(&self, image: Option<UploadedImage>) {
        self.lock_session().removal.image = image.clone();
        self.advise_single(image.as_ref(), PromptSlot::Generate).await;
    }

    pub async fn set_draw_background(&self, image: Option<UploadedImage>) {
        self.lock_session().draw.background = image.clone();
        self.advise_single(image.as_ref(), PromptSlot::Generate).await;
    }

    pub async fn set_video_frame(&self, frame: VideoFrame, image: Option<UploadedImage>) {
        {
            let mut session = self.lock_session();
            match frame {
                VideoFrame::Start => session.video.start_frame = image.clone(),
                VideoFrame::End => session.video.end_frame = image.clone(),
            }
        }
        self.advise_single(image.as_ref(), PromptSlot::Video).await;
    }

    /// Adds custom weapon or companion images, then strips each background in
    /// turn, replacing the image in place.
    pub async fn upload_custom_images(&self, kind: CustomKind, incoming: Vec<UploadedImage>) {
        let incoming: Vec<UploadedImage> = incoming
            .into_iter()
            .map(|image| UploadedImage {
                processing: true,
                has_error: false,
                ..image
            })
            .collect();
        let kept: Vec<UploadedImage> = {
            let mut session = self.lock_session();
            let list = custom_list(&mut session.scene, kind);
            push_custom_images(list, incoming.clone());
            incoming
                .iter()
                .filter(|image| list.iter().any(|held| held.id == image.id))
                .cloned()
                .collect()
        };

        self.advisor.clear_chips();
        if incoming.len() > 1 {
            let data: Vec<EncodedImage> = incoming.iter().map(|image| image.data.clone()).collect();
            self.advisor
                .request_chips(&self.shared, &data, PromptSlot::Scene)
                .await;
        }

        let single = incoming.len() == 1;
        for image in kept {
            let removed = self.shared.backend.remove_background(&image.data, false).await;
            match removed {
                Ok(output) => {
                    let dims = imaging::dimensions(&output);
                    self.update_custom(kind, &image.id, |held| {
                        held.data = output.clone();
                        held.file_name = format!("processed-{}", image.file_name);
                        held.width = dims.map(|(width, _)| width);
                        held.height = dims.map(|(_, height)| height);
                        held.processing = false;
                        held.is_placeholder = false;
                    });
                    if single {
                        self.advisor
                            .request_suggestion(&self.shared, &output, PromptSlot::Scene)
                            .await;
                    }
                }
                Err(err) => {
                    self.shared.toasts.error(format!(
                        "Automatic background removal failed: {}",
                        image.file_name
                    ));
                    self.shared.events.record(
                        "background_removal_failed",
                        payload(json!({
                            "kind": kind.as_str(),
                            "file_name": image.file_name,
                            "error": format!("{err:#}"),
                        })),
                    );
                    self.update_custom(kind, &image.id, |held| {
                        held.processing = false;
                        held.has_error = true;
                    });
                }
            }
        }
    }

    pub fn pending_suggestion(&self) -> Option<SuggestionContext> {
        self.advisor.pending()
    }

    pub fn chips(&self) -> Vec<Chip> {
        self.advisor.chips()
    }

    pub fn resolve_suggestion(&self, resolution: Resolution) -> Option<PromptSlot> {
        let applied = self.advisor.resolve(&mut self.lock_session(), resolution);
        if applied.is_some() {
            self.shared.toasts.success(APPLIED_MESSAGE);
        }
        applied
    }

    pub fn apply_chip(&self, index: usize) -> Option<Chip> {
        let chip = self.advisor.take_chip(&mut self.lock_session(), index);
        if chip.is_some() {
            self.shared.toasts.success(APPLIED_MESSAGE);
        }
        chip
    }

    // -- image generation ---------------------------------------------------

    /// Dispatches the active draft. Structured-scene mode runs a batch when
    /// scenes are selected; any other mode runs a flat generation.
    pub async fn generate(&self) -> StudioResult<GenerationOutcome> {
        let result = match self.ensure_idle() {
            Ok(()) => self.run_generation(None, None).await,
            Err(err) => Err(err),
        };
        self.surface("Generation", result)
    }

    /// Single structured unit with a caller-supplied prompt; one variant.
    pub async fn generate_with_override(&self, prompt: &str) -> StudioResult<GenerationOutcome> {
        let result = if let Err(err) = self.ensure_idle() {
            Err(err)
        } else if prompt.trim().is_empty() {
            Err(InputError::EmptyPrompt.into())
        } else {
            self.switch_mode(Mode::StructuredScene);
            self.run_generation(None, Some(prompt.to_string())).await
        };
        self.surface("Generation", result)
    }

    pub async fn generate_scenes(&self, scenes: Vec<String>) -> StudioResult<GenerationOutcome> {
        if let Err(err) = self.ensure_idle() {
            return self.surface("Generation", Err(err));
        }
        {
            let mut session = self.lock_session();
            session.switch_mode(Mode::StructuredScene);
            session.scene.scenes = scenes.clone();
        }
        let result = self.run_generation(Some(scenes), None).await;
        self.surface("Generation", result)
    }

    /// Picks five distinct scenes and runs them as a batch.
    pub async fn generate_random_scenes(&self) -> StudioResult<GenerationOutcome> {
        if let Err(err) = self.ensure_idle() {
            return self.surface("Generation", Err(err));
        }
        if !self.lock_session().scene.has_subject() {
            return self.surface("Generation", Err(InputError::MissingSubject.into()));
        }
        let scenes = {
            let mut rng = lock(&self.rng);
            sample_distinct(&mut **rng, &self.catalog.scene_keys(), RANDOM_SCENE_COUNT)
        };
        self.shared.toasts.info(format!(
            "Picked {} random scenes, starting generation...",
            scenes.len()
        ));
        self.generate_scenes(scenes).await
    }

    async fn run_generation(
        &self,
        scenes: Option<Vec<String>>,
        override_prompt: Option<String>,
    ) -> StudioResult<GenerationOutcome> {
        self.advisor.clear_chips();
        let prepared = self.prepare(scenes, override_prompt)?;
        match prepared {
            Prepared::Single(unit) => self.images.run_single(&self.shared, unit).await,
            Prepared::Batch(batch) => self.images.run_batch(&self.shared, batch).await,
        }
    }

    /// Validates the active draft and composes what will be sent. Nothing
    /// reaches the backend when this fails.
    fn prepare(
        &self,
        scenes: Option<Vec<String>>,
        override_prompt: Option<String>,
    ) -> StudioResult<Prepared> {
        let mut session = self.lock_session();
        if session.mode != Mode::StructuredScene {
            session.switch_mode(Mode::Generate);
            let draft = &session.generate;
            let ratio = draft.aspect_ratio.ok_or(InputError::MissingAspectRatio)?;
            if draft.prompt.trim().is_empty() && !draft.references.has_uploads() {
                return Err(InputError::MissingSubject.into());
            }
            let mut references = vec![self.placeholder(ratio)?];
            references.extend(draft.references.uploads().cloned());
            return Ok(Prepared::Single(SingleUnit {
                prompt: compose_simple(&draft.prompt),
                aspect_ratio: ratio,
                references,
                count: SINGLE_UNIT_VARIANTS,
            }));
        }

        let draft = &session.scene;
        let ratio = draft.aspect_ratio.ok_or(InputError::MissingAspectRatio)?;
        if !draft.has_subject() {
            return Err(InputError::MissingSubject.into());
        }
        let mut references = vec![self.placeholder(ratio)?];
        references.extend(draft.character.iter().cloned());
        references.extend(draft.custom_weapons.iter().cloned());
        references.extend(draft.custom_companions.iter().cloned());

        let composer = PromptComposer::new(&self.catalog);
        let mut rng = lock(&self.rng);
        if let Some(prompt) = override_prompt {
            return Ok(Prepared::Single(SingleUnit {
                prompt: compose_override(&prompt),
                aspect_ratio: ratio,
                references,
                count: 1,
            }));
        }
        let scenes = scenes.unwrap_or_else(|| draft.scenes.clone());
        if scenes.is_empty() {
            return Ok(Prepared::Single(SingleUnit {
                prompt: composer.structured(draft, &mut **rng),
                aspect_ratio: ratio,
                references,
                count: SINGLE_UNIT_VARIANTS,
            }));
        }
        Ok(Prepared::Batch(SceneBatch {
            scenes: composer.scenes(draft, &scenes, &mut **rng),
            aspect_ratio: ratio,
            references,
        }))
    }

    pub fn results(&self) -> Vec<GeneratedImage> {
        self.images.results()
    }

    pub fn is_generating(&self) -> bool {
        self.images.is_busy()
    }

    // -- effects ------------------------------------------------------------

    pub async fn remove_background(&self) -> StudioResult<GeneratedImage> {
        let source = {
            let session = self.lock_session();
            session.removal.image.clone().map(|image| {
                let effect = Effect::RemoveBackground {
                    green_screen: session.removal.green_screen,
                };
                let source = EffectSource {
                    data: image.data,
                    file_name: image.file_name,
                    prompt: String::new(),
                };
                (effect, source)
            })
        };
        let result = match source {
            Some((effect, source)) => self.images.apply_effect(&self.shared, effect, source).await,
            None => Err(InputError::MissingImage.into()),
        };
        self.surface("Background removal", result)
    }

    pub async fn upscale(&self, image: &GeneratedImage) -> StudioResult<GeneratedImage> {
        self.switch_mode(Mode::Generate);
        let result = self
            .images
            .apply_effect(&self.shared, Effect::Upscale, effect_source(image))
            .await;
        if result.is_ok() {
            self.shared.toasts.success("Image upscaled");
        }
        self.surface("Upscale", result)
    }

    pub async fn zoom_out(&self, image: &GeneratedImage) -> StudioResult<GeneratedImage> {
        self.switch_mode(Mode::Generate);
        let result = self
            .images
            .apply_effect(&self.shared, Effect::ZoomOut, effect_source(image))
            .await;
        if result.is_ok() {
            self.shared.toasts.success("Image zoomed out");
        }
        self.surface("Zoom out", result)
    }

    // -- prompt helpers -----------------------------------------------------

    /// Rewrites the active mode's prompt through the backend.
    pub async fn optimize_prompt(&self) -> StudioResult<String> {
        let (slot, text) = {
            let session = self.lock_session();
            let slot = session.active_prompt_slot();
            (slot, session.prompt(slot).to_string())
        };
        let result = if text.trim().is_empty() {
            Err(InputError::EmptyPrompt.into())
        } else {
            self.shared
                .backend
                .optimize_prompt(&text)
                .await
                .map_err(StudioError::Backend)
        };
        if let Ok(optimized) = &result {
            *self.lock_session().prompt_mut(slot) = optimized.clone();
            self.shared.toasts.success("Prompt optimized");
        }
        self.surface("Optimization", result)
    }

    /// Adds a backend idea to the active prompt. For image drafts the previous
    /// inspiration is swapped out instead of stacking.
    pub async fn inspire_prompt(&self) -> StudioResult<String> {
        let result = self
            .shared
            .backend
            .inspire_prompt()
            .await
            .map_err(StudioError::Backend);
        if let Ok(inspired) = &result {
            let mut session = self.lock_session();
            let session = &mut *session;
            let (prompt, fragment) = match session.active_prompt_slot() {
                PromptSlot::Generate => (
                    &mut session.generate.prompt,
                    Some(&mut session.generate.inspired_fragment),
                ),
                PromptSlot::Scene => (
                    &mut session.scene.prompt,
                    Some(&mut session.scene.inspired_fragment),
                ),
                PromptSlot::Video => (&mut session.video.prompt, None),
            };
            let previous = fragment
                .as_deref()
                .and_then(|fragment| fragment.as_deref())
                .filter(|previous| !previous.is_empty() && prompt.contains(previous))
                .map(str::to_string);
            match previous {
                Some(previous) => *prompt = prompt.replacen(&previous, inspired, 1),
                None => crate::advisor::append_block(prompt, inspired),
            }
            if let Some(fragment) = fragment {
                *fragment = Some(inspired.clone());
            }
        }
        self.surface("Inspiration", result)
    }

    // -- video --------------------------------------------------------------

    pub async fn generate_video(&self) -> StudioResult<VeoHistoryItem> {
        let params = {
            let session = self.lock_session();
            let mut rng = lock(&self.rng);
            compose_video(&session.video, &self.catalog, &mut **rng)
        };
        let result = match params {
            Ok(params) => self.videos.dispatch(&self.shared, params).await,
            Err(err) => Err(err),
        };
        self.surface("Video generation", result)
    }

    /// Re-sends the displayed unit's parameters, else the last success, as-is.
    pub async fn regenerate_video(&self) -> StudioResult<VeoHistoryItem> {
        let result = match self.videos.regenerate_params() {
            Ok(params) => self.videos.dispatch(&self.shared, params).await,
            Err(err) => Err(err),
        };
        self.surface("Video generation", result)
    }

    pub fn restore_video(&self) -> StudioResult<()> {
        let result = self.videos.restore_into(&mut self.lock_session().video);
        if result.is_ok() {
            self.shared.toasts.success("Settings restored");
        }
        self.surface("Restore", result)
    }

    pub fn use_video_text(&self) -> StudioResult<()> {
        let result = self.videos.use_text_into(&mut self.lock_session().video);
        if result.is_ok() {
            self.shared
                .toasts
                .success("Using the video text; frames cleared");
        }
        self.surface("Use text", result)
    }

    pub fn delete_video(&self, id: &str) -> StudioResult<()> {
        let result = self.videos.delete(&self.shared, id);
        self.surface("Delete", result)
    }

    pub fn play_video(&self, id: &str) -> StudioResult<VeoHistoryItem> {
        let result = self.videos.play(id);
        self.surface("Play", result)
    }

    pub fn video_state(&self) -> VideoState {
        self.videos.state()
    }

    // -- reuse --------------------------------------------------------------

    pub async fn send_to_video(&self, image: &GeneratedImage, frame: VideoFrame) {
        let (name, label) = match frame {
            VideoFrame::Start => ("video-frame-start.png", "start"),
            VideoFrame::End => ("video-frame-end.png", "end"),
        };
        self.switch_mode(Mode::Video);
        self.set_video_frame(frame, Some(UploadedImage::from_generated(image, name)))
            .await;
        self.shared
            .toasts
            .success(format!("Image sent to the {label} frame"));
    }

    pub async fn use_image(&self, image: &GeneratedImage, target: ReuseTarget) -> StudioResult<()> {
        let upload = UploadedImage::from_generated(image, format!("used-{}.png", image.id));
        match target {
            ReuseTarget::Reference => {
                self.switch_mode(Mode::Generate);
                self.upload_references(vec![upload]).await;
                if let Some(ratio) = image
                    .aspect_ratio
                    .as_deref()
                    .and_then(|raw| raw.parse::<AspectRatio>().ok())
                {
                    self.select_aspect_ratio(ratio)?;
                }
                self.shared.toasts.success("Image added to references");
            }
            ReuseTarget::Character => {
                self.switch_mode(Mode::StructuredScene);
                let has_character = self.lock_session().scene.character.is_some();
                if !has_character {
                    self.set_character_image(Some(upload)).await;
                }
            }
            ReuseTarget::RemoveBackground => {
                self.switch_mode(Mode::BackgroundRemoval);
                self.set_removal_image(Some(upload)).await;
            }
            ReuseTarget::DrawBackground => {
                self.switch_mode(Mode::Draw);
                self.set_draw_background(Some(upload)).await;
                self.shared.toasts.success("Image set as canvas background");
            }
        }
        Ok(())
    }

    pub async fn use_history_item(&self, id: &str, target: ReuseTarget) -> StudioResult<()> {
        let item = self.shared.history().get(id).map(HistoryItem::to_generated);
        match item {
            Some(image) => self.use_image(&image, target).await,
            None => self.surface("Reuse", Err(StudioError::UnknownHistoryItem(id.to_string()))),
        }
    }

    /// Takes an exported drawing as the scene character (when none is set)
    /// or as a flat-mode reference.
    pub async fn use_drawing(&self, drawing: EncodedImage) -> StudioResult<()> {
        let (mode, ratio, has_character) = {
            let session = self.lock_session();
            (session.mode, session.draw.aspect_ratio, session.scene.character.is_some())
        };
        if ratio.is_none() {
            return self.surface("Use drawing", Err(InputError::MissingAspectRatio.into()));
        }
        let upload = imaging::uploaded(drawing, "drawing.png");
        if mode == Mode::StructuredScene {
            if !has_character {
                self.set_character_image(Some(upload)).await;
            }
        } else {
            self.switch_mode(Mode::Generate);
            self.upload_references(vec![upload]).await;
        }
        self.shared.toasts.success("Canvas used as a reference");
        Ok(())
    }

    /// Loads a structured result back into the scene draft for a cinematic
    /// re-render: the image becomes the character and the prompt gains the
    /// cinematic clause; equipment, companions and scenes are reset.
    pub async fn cinematic_upgrade(&self, image: &GeneratedImage) -> StudioResult<()> {
        if !is_structured_prompt(&image.prompt) {
            return self.surface(
                "Cinematic upgrade",
                Err(InputError::NotStructuredPrompt.into()),
            );
        }
        self.switch_mode(Mode::StructuredScene);
        if let Some(ratio) = image
            .aspect_ratio
            .as_deref()
            .and_then(|raw| raw.parse::<AspectRatio>().ok())
        {
            self.select_aspect_ratio(ratio)?;
        }
        let upload = UploadedImage::from_generated(image, "upgrade-ref.png");
        {
            let mut session = self.lock_session();
            let scene = &mut session.scene;
            scene.character = Some(upload.clone());
            scene.prompt = with_cinematic(&image.prompt);
            scene.custom_weapons.clear();
            scene.custom_companions.clear();
            scene.weapon = None;
            scene.vehicle = None;
            scene.companion = None;
            scene.director = DirectorChoice::Random;
            scene.mission = MissionChoice::Random;
            scene.cinematic = true;
            scene.scenes.clear();
        }
        self.shared
            .toasts
            .success("Upgrade settings loaded; review them and generate.");
        self.advise_single(Some(&upload), PromptSlot::Scene).await;
        Ok(())
    }

    // -- history ------------------------------------------------------------

    pub fn history(&self) -> Vec<HistoryItem> {
        self.shared.history().items().to_vec()
    }

    /// Selects an entry and fills its analysis on first inspection.
    pub async fn inspect_history(&self, id: &str) -> StudioResult<HistoryItem> {
        let item = self.shared.history().get(id).cloned();
        let Some(item) = item else {
            return self.surface("Inspect", Err(StudioError::UnknownHistoryItem(id.to_string())));
        };
        {
            let mut session = self.lock_session();
            session.switch_mode(Mode::HistoryView);
            session.history_view.selected = Some(id.to_string());
        }
        if item.analysis.is_some() {
            return Ok(item);
        }

        let analysis = match self.shared.backend.analyze_image(&item.data).await {
            Ok(analysis) => analysis,
            Err(err) => return self.surface("Analysis", Err(StudioError::Backend(err))),
        };
        let updated = {
            let mut history = self.shared.history();
            let result = history.set_analysis(id, analysis.clone());
            let updated = history.get(id).cloned();
            drop(history);
            self.shared.degrade(result.map(|_| ()));
            updated
        };
        self.shared
            .events
            .record("history_analyzed", payload(json!({ "image_id": id })));
        Ok(updated.unwrap_or(HistoryItem {
            analysis: Some(analysis),
            ..item
        }))
    }

    pub fn delete_history(&self, id: &str) -> StudioResult<()> {
        let result = {
            let mut history = self.shared.history();
            if history.get(id).is_none() {
                drop(history);
                return self.surface("Delete", Err(StudioError::UnknownHistoryItem(id.to_string())));
            }
            history.delete(id)
        };
        self.shared.degrade(result);
        Ok(())
    }

    pub fn clear_history(&self) {
        let result = self.shared.history().clear();
        self.shared.degrade(result);
        self.shared.toasts.info("History cleared");
    }

    // -- preferences --------------------------------------------------------

    pub fn theme(&self) -> Theme {
        self.preferences.theme()
    }

    pub fn set_theme(&self, theme: Theme) {
        if let Err(err) = self.preferences.set_theme(theme) {
            self.shared
                .toasts
                .error(format!("Saving the theme failed: {err}"));
        }
    }

    pub fn toggle_theme(&self) -> Theme {
        let next = self.theme().toggled();
        self.set_theme(next);
        next
    }

    // -- internals ----------------------------------------------------------

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    /// Rejects a dispatch before it touches the draft or the chips.
    fn ensure_idle(&self) -> StudioResult<()> {
        if self.images.is_busy() {
            return Err(StudioError::Busy);
        }
        Ok(())
    }

    fn placeholder(&self, ratio: AspectRatio) -> StudioResult<UploadedImage> {
        imaging::placeholder_for(ratio).map_err(StudioError::Imaging)
    }

    async fn advise_single(&self, image: Option<&UploadedImage>, target: PromptSlot) {
        if let Some(image) = image.filter(|image| !image.is_placeholder) {
            self.advisor
                .request_suggestion(&self.shared, &image.data, target)
                .await;
        }
    }

    async fn advise_uploads(&self, uploads: &[UploadedImage], target: PromptSlot) {
        match uploads {
            [] => {}
            [single] => self.advise_single(Some(single), target).await,
            many => {
                let data: Vec<EncodedImage> = many.iter().map(|image| image.data.clone()).collect();
                self.advisor.request_chips(&self.shared, &data, target).await;
            }
        }
    }

    fn update_custom(&self, kind: CustomKind, id: &str, update: impl FnOnce(&mut UploadedImage)) {
        let mut session = self.lock_session();
        if let Some(held) = custom_list(&mut session.scene, kind)
            .iter_mut()
            .find(|held| held.id == id)
        {
            update(held);
        }
    }

    /// Every failed operation also leaves a toast behind.
    fn surface<T>(&self, action: &str, result: StudioResult<T>) -> StudioResult<T> {
        if let Err(err) = &result {
            match err {
                StudioError::Input(InputError::NothingToRegenerate | InputError::NothingToRestore) => {
                    self.shared.toasts.info(err.to_string());
                }
                _ => {
                    self.shared.toasts.error(format!("{action} failed: {err}"));
                }
            }
        }
        result
    }
}

fn custom_list(scene: &mut SceneDraft, kind: CustomKind) -> &mut Vec<UploadedImage> {
    match kind {
        CustomKind::Weapon => &mut scene.custom_weapons,
        CustomKind::Companion => &mut scene.custom_companions,
    }
}

fn effect_source(image: &GeneratedImage) -> EffectSource {
    EffectSource {
        data: image.data.clone(),
        file_name: format!("{}.png", image.id),
        prompt: image.prompt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use atelier_contracts::media::VideoAspectRatio;
    use atelier_contracts::random::{ScriptedRandom, SeededRandom};
    use atelier_contracts::storage::{FileStorage, MemoryStorage};

    use super::*;
    use crate::composer::OUTPAINT_GUARD;
    use crate::generation::GenerationStatus;
    use crate::history::{HISTORY_KEY, STORAGE_FULL_WARNING};
    use crate::testing::{upload, ScriptedBackend};
    use crate::toast::Severity;

    fn studio_with(backend: Arc<ScriptedBackend>, storage: Arc<dyn DurableStorage>) -> Studio {
        Studio::new(backend, storage, EventWriter::disabled("test")).with_random(SeededRandom::new(7))
    }

    fn studio(backend: Arc<ScriptedBackend>) -> Studio {
        studio_with(backend, Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn generate_requires_ratio_and_subject_before_any_call() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());

        studio.with_session(|session| session.generate.prompt = "a koi".to_string());
        let err = studio.generate().await.err();
        assert!(matches!(err, Some(StudioError::Input(InputError::MissingAspectRatio))));

        studio.with_session(|session| session.generate.prompt.clear());
        studio.select_aspect_ratio(AspectRatio::Square)?;
        let err = studio.generate().await.err();
        assert!(matches!(err, Some(StudioError::Input(InputError::MissingSubject))));

        assert!(backend.calls_to("generate_images").is_empty());
        assert_eq!(studio.toasts().messages(Severity::Error).len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn flat_generation_sends_placeholder_first() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.select_aspect_ratio(AspectRatio::Landscape)?;
        studio.upload_references(vec![upload("ref-a")?, upload("ref-b")?]).await;
        studio.with_session(|session| session.generate.prompt = "a koi".to_string());

        let outcome = studio.generate().await?;
        assert_eq!(outcome.images.len(), SINGLE_UNIT_VARIANTS);

        let call = &backend.calls_to("generate_images")[0];
        assert_eq!(call.prompt, compose_simple("a koi"));
        let names: Vec<&str> = call.references.iter().map(|image| image.file_name.as_str()).collect();
        assert_eq!(names, vec!["placeholder-16:9.png", "ref-a", "ref-b"]);
        assert!(call.references[0].is_placeholder);
        assert_eq!(studio.history().len(), SINGLE_UNIT_VARIANTS);
        Ok(())
    }

    #[tokio::test]
    async fn random_scenes_with_failures_deliver_the_rest() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_generates([0, 2]);
        let studio = studio(backend.clone());
        studio.switch_mode(Mode::StructuredScene);
        studio.select_aspect_ratio(AspectRatio::Portrait)?;
        studio.with_session(|session| session.scene.prompt = "a netrunner".to_string());

        let outcome = studio.generate_random_scenes().await?;
        assert_eq!(outcome.images.len(), 3);
        assert_eq!(
            outcome.status,
            GenerationStatus::Partial {
                succeeded: 3,
                failed: 2
            }
        );
        assert_eq!(studio.results().len(), 3);
        assert_eq!(studio.history().len(), 3);

        let calls = backend.calls_to("generate_images");
        assert_eq!(calls.len(), RANDOM_SCENE_COUNT);
        let mut scenes = studio.session().scene.scenes;
        scenes.sort();
        scenes.dedup();
        assert_eq!(scenes.len(), RANDOM_SCENE_COUNT);
        assert!(calls.iter().all(|call| call.prompt.ends_with(OUTPAINT_GUARD)));
        Ok(())
    }

    #[tokio::test]
    async fn random_scenes_need_a_subject() {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.switch_mode(Mode::StructuredScene);
        let err = studio.generate_random_scenes().await.err();
        assert!(matches!(err, Some(StudioError::Input(InputError::MissingSubject))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn override_prompt_requests_one_variant() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.switch_mode(Mode::StructuredScene);
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.with_session(|session| session.scene.prompt = "a fixer".to_string());

        studio.generate_with_override("exact words").await?;
        let call = &backend.calls_to("generate_images")[0];
        assert_eq!(call.count, 1);
        assert_eq!(call.prompt, compose_override("exact words"));
        Ok(())
    }

    #[tokio::test]
    async fn scene_references_include_character_and_customs() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.switch_mode(Mode::StructuredScene);
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.set_character_image(Some(upload("face")?)).await;
        studio
            .upload_custom_images(CustomKind::Companion, vec![upload("dog")?])
            .await;

        studio.generate().await?;
        let call = &backend.calls_to("generate_images")[0];
        assert_eq!(call.count, SINGLE_UNIT_VARIANTS);
        let names: Vec<&str> = call.references.iter().map(|image| image.file_name.as_str()).collect();
        assert_eq!(names, vec!["placeholder-1:1.png", "face", "processed-dog"]);
        Ok(())
    }

    #[tokio::test]
    async fn single_upload_suggestion_merges_into_target() -> anyhow::Result<()> {
        let studio = studio(Arc::new(ScriptedBackend::new()));
        studio.with_session(|session| session.video.prompt = "drone shot".to_string());
        studio
            .set_video_frame(VideoFrame::Start, Some(upload("frame")?))
            .await;

        let pending = studio.pending_suggestion();
        assert_eq!(pending.map(|context| context.target), Some(PromptSlot::Video));
        assert_eq!(studio.resolve_suggestion(Resolution::Both), Some(PromptSlot::Video));
        assert_eq!(
            studio.session().video.prompt,
            "drone shot\n\nanalysis of image\n\nsuggestion for image"
        );
        assert_eq!(
            studio.toasts().messages(Severity::Success),
            vec![APPLIED_MESSAGE.to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn chips_are_cleared_by_new_generation() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.upload_references(vec![upload("a")?, upload("b")?]).await;
        assert_eq!(studio.chips().len(), 2);
        assert!(studio.pending_suggestion().is_none());

        studio.generate().await?;
        assert!(studio.chips().is_empty());

        studio.upload_references(vec![upload("c")?, upload("d")?]).await;
        let chip = studio.apply_chip(0).map(|chip| chip.text);
        assert_eq!(chip.as_deref(), Some("chip 1"));
        assert_eq!(studio.session().generate.prompt, "chip 1");
        assert!(studio.chips().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn busy_dispatch_leaves_draft_and_chips_alone() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let gate = backend.gated();
        let studio = studio(backend.clone());
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.with_session(|session| {
            session.generate.prompt = "a koi".to_string();
            session.scene.scenes = vec!["Rooftop Helipad".to_string()];
        });

        let first = studio.generate();
        let second = async {
            gate.entered.notified().await;
            studio.upload_references(vec![upload("a")?, upload("b")?]).await;
            let scenes = studio.generate_scenes(vec!["Neon Market".to_string()]).await;
            let overridden = studio.generate_with_override("a heist").await;
            let random = studio.generate_random_scenes().await;
            let snapshot = (studio.mode(), studio.session().scene.scenes, studio.chips().len());
            gate.release.notify_one();
            anyhow::Ok((scenes, overridden, random, snapshot))
        };
        let (first, second) = tokio::join!(first, second);
        let (scenes, overridden, random, (mode, drafted, chips)) = second?;

        assert!(first.is_ok());
        assert!(matches!(scenes, Err(StudioError::Busy)));
        assert!(matches!(overridden, Err(StudioError::Busy)));
        assert!(matches!(random, Err(StudioError::Busy)));
        assert_eq!(mode, Mode::Generate);
        assert_eq!(drafted, vec!["Rooftop Helipad".to_string()]);
        assert_eq!(chips, 2);
        assert_eq!(backend.calls_to("generate_images").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn custom_uploads_are_processed_in_place() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio
            .upload_custom_images(CustomKind::Weapon, vec![upload("blade")?, upload("pistol")?])
            .await;

        let weapons = studio.session().scene.custom_weapons;
        assert_eq!(weapons.len(), 2);
        assert!(weapons.iter().all(|image| !image.processing && !image.has_error));
        assert_eq!(weapons[0].file_name, "processed-blade");
        assert_eq!((weapons[1].width, weapons[1].height), (Some(8), Some(8)));
        assert_eq!(studio.chips().len(), 2);
        assert_eq!(backend.calls_to("remove_background").len(), 2);
        // several uploads get chips, never a suggestion pair
        assert!(backend.calls_to("editing_suggestion").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_custom_processing_flags_the_image() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_background_removal();
        let studio = studio(backend.clone());
        studio
            .upload_custom_images(CustomKind::Companion, vec![upload("drone")?])
            .await;

        let companions = studio.session().scene.custom_companions;
        assert!(companions[0].has_error && !companions[0].processing);
        assert_eq!(
            studio.toasts().messages(Severity::Error),
            vec!["Automatic background removal failed: drone".to_string()]
        );
        assert!(backend.calls_to("editing_suggestion").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn persistence_rejection_still_reports_success() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::with_quota(16));
        let studio = studio_with(Arc::new(ScriptedBackend::new()), storage.clone());
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.with_session(|session| session.generate.prompt = "a koi".to_string());

        let outcome = studio.generate().await?;
        assert_eq!(outcome.status, GenerationStatus::Complete);
        assert_eq!(studio.history().len(), SINGLE_UNIT_VARIANTS);
        assert!(studio
            .toasts()
            .messages(Severity::Error)
            .contains(&STORAGE_FULL_WARNING.to_string()));
        assert_eq!(storage.read(HISTORY_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn video_flow_composes_restores_and_deletes() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = Studio::new(
            backend.clone(),
            Arc::new(MemoryStorage::new()),
            EventWriter::disabled("test"),
        )
        .with_random(ScriptedRandom::new([0]));
        studio.switch_mode(Mode::Video);
        studio.with_session(|session| {
            session.video.prompt = "rooftop chase".to_string();
            session.video.aspect_ratio = Some(VideoAspectRatio::Portrait);
        });

        let first = studio.generate_video().await?;
        let ridley = studio
            .catalog()
            .directors()
            .next()
            .map(|style| format!("rooftop chase {}", style.prompt));
        assert_eq!(Some(first.params.prompt.clone()), ridley);

        let second = studio.regenerate_video().await?;
        assert_eq!(second.params.prompt, first.params.prompt);

        studio.use_video_text()?;
        assert_eq!(studio.session().video.prompt, first.params.prompt);
        assert!(studio.video_state().displayed.is_none());

        studio.play_video(&first.id)?;
        studio.delete_video(&first.id)?;
        let state = studio.video_state();
        assert_eq!(state.displayed.map(|item| item.id), Some(second.id));
        assert_eq!(state.history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn nothing_to_regenerate_is_an_info_notice() {
        let studio = studio(Arc::new(ScriptedBackend::new()));
        let err = studio.regenerate_video().await.err();
        assert!(matches!(err, Some(StudioError::Input(InputError::NothingToRegenerate))));
        assert_eq!(studio.toasts().messages(Severity::Info).len(), 1);
        assert!(studio.toasts().messages(Severity::Error).is_empty());
    }

    #[tokio::test]
    async fn inspiration_replaces_previous_fragment() -> anyhow::Result<()> {
        let studio = studio(Arc::new(ScriptedBackend::new()));
        studio.with_session(|session| session.generate.prompt = "a koi".to_string());

        studio.inspire_prompt().await?;
        assert_eq!(studio.session().generate.prompt, "a koi\n\ninspired idea 1");
        studio.inspire_prompt().await?;
        assert_eq!(studio.session().generate.prompt, "a koi\n\ninspired idea 2");

        studio.switch_mode(Mode::Video);
        studio.inspire_prompt().await?;
        studio.inspire_prompt().await?;
        assert_eq!(
            studio.session().video.prompt,
            "inspired idea 3\n\ninspired idea 4"
        );
        Ok(())
    }

    #[tokio::test]
    async fn optimize_rejects_empty_prompt() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        assert!(matches!(
            studio.optimize_prompt().await,
            Err(StudioError::Input(InputError::EmptyPrompt))
        ));
        studio.with_session(|session| session.generate.prompt = "cat".to_string());
        assert_eq!(studio.optimize_prompt().await?, "optimized: cat");
        assert_eq!(studio.session().generate.prompt, "optimized: cat");
        Ok(())
    }

    #[tokio::test]
    async fn cinematic_upgrade_only_accepts_structured_results() -> anyhow::Result<()> {
        let studio = studio(Arc::new(ScriptedBackend::new()));
        let flat = GeneratedImage::new(imaging::solid_png(4, 4, [0, 0, 0])?, "flat", "a koi pond");
        assert!(matches!(
            studio.cinematic_upgrade(&flat).await,
            Err(StudioError::Input(InputError::NotStructuredPrompt))
        ));

        let mut structured = GeneratedImage::new(
            imaging::solid_png(4, 4, [0, 0, 0])?,
            "scene",
            "A character in a cyberpunk setting. Action: run.",
        );
        structured.aspect_ratio = Some("3:4".to_string());
        studio.with_session(|session| {
            session.scene.weapon = Some("Katana".to_string());
            session.scene.scenes = vec!["Neon Market".to_string()];
        });
        studio.cinematic_upgrade(&structured).await?;

        let session = studio.session();
        assert_eq!(session.mode, Mode::StructuredScene);
        assert!(session.scene.cinematic);
        assert!(session.scene.weapon.is_none() && session.scene.scenes.is_empty());
        assert_eq!(session.scene.aspect_ratio, Some(AspectRatio::ClassicPortrait));
        assert_eq!(session.scene.prompt, with_cinematic(&structured.prompt));
        assert!(session.scene.character.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn history_inspection_analyzes_once() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let studio = studio(backend.clone());
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.with_session(|session| session.generate.prompt = "a koi".to_string());
        studio.generate().await?;
        let id = studio.history()[0].id.clone();

        let first = studio.inspect_history(&id).await?;
        let second = studio.inspect_history(&id).await?;
        assert!(first.analysis.is_some());
        assert_eq!(first.analysis, second.analysis);
        assert_eq!(backend.calls_to("analyze_image").len(), 1);
        assert_eq!(studio.session().history_view.selected.as_deref(), Some(id.as_str()));

        studio.delete_history(&id)?;
        assert_eq!(studio.history().len(), SINGLE_UNIT_VARIANTS - 1);
        assert!(studio.delete_history(&id).is_err());
        studio.clear_history();
        assert!(studio.history().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn history_reuse_as_reference_selects_its_ratio() -> anyhow::Result<()> {
        let studio = studio(Arc::new(ScriptedBackend::new()));
        studio.switch_mode(Mode::StructuredScene);
        studio.select_aspect_ratio(AspectRatio::Square)?;
        studio.with_session(|session| session.scene.prompt = "a nomad".to_string());
        studio.generate().await?;
        let id = studio.history()[0].id.clone();

        studio.use_history_item(&id, ReuseTarget::Reference).await?;
        let session = studio.session();
        assert_eq!(session.mode, Mode::Generate);
        assert_eq!(session.generate.aspect_ratio, Some(AspectRatio::Square));
        assert_eq!(session.generate.references.uploads().count(), 1);
        assert!(session.generate.references.placeholder().is_some());

        assert!(matches!(
            studio.use_history_item("missing", ReuseTarget::Character).await,
            Err(StudioError::UnknownHistoryItem(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn history_is_reloaded_from_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage: Arc<dyn DurableStorage> = Arc::new(FileStorage::new(dir.path()));
        let studio = studio_with(Arc::new(ScriptedBackend::new()), storage.clone());
        studio.select_aspect_ratio(AspectRatio::Landscape)?;
        studio.with_session(|session| session.generate.prompt = "a koi".to_string());
        let outcome = studio.generate().await?;

        let reopened = studio_with(Arc::new(ScriptedBackend::new()), storage);
        let ids: Vec<String> = reopened.history().into_iter().map(|item| item.id).collect();
        let expected: Vec<String> = outcome.images.into_iter().map(|image| image.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(reopened.history()[0].aspect_ratio.as_deref(), Some("16:9"));
        Ok(())
    }

    #[tokio::test]
    async fn theme_round_trips_through_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let studio = studio_with(Arc::new(ScriptedBackend::new()), storage.clone());
        assert_eq!(studio.theme(), Theme::Cyberpunk);
        assert_eq!(studio.toggle_theme(), Theme::Classic);
        let reopened = studio_with(Arc::new(ScriptedBackend::new()), storage);
        assert_eq!(reopened.theme(), Theme::Classic);
    }
}

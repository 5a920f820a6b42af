//! Mode controller and the per-mode draft slots it switches between.

use std::fmt;
use std::str::FromStr;

use atelier_contracts::catalog::{DirectorChoice, MissionChoice};
use atelier_contracts::media::{
    AspectRatio, UploadedImage, VeoParams, VideoAspectRatio, DEFAULT_VIDEO_DURATION_SECS,
};
use serde::{Deserialize, Serialize};

pub const MAX_REFERENCE_IMAGES: usize = 8;
pub const MAX_CUSTOM_IMAGES: usize = 8;
pub const DEFAULT_BRUSH_SIZE: u32 = 10;
pub const MIN_BRUSH_SIZE: u32 = 1;
pub const MAX_BRUSH_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Generate,
    StructuredScene,
    BackgroundRemoval,
    Draw,
    Video,
    HistoryView,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Generate,
        Mode::StructuredScene,
        Mode::BackgroundRemoval,
        Mode::Draw,
        Mode::Video,
        Mode::HistoryView,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Generate => "generate",
            Mode::StructuredScene => "structured_scene",
            Mode::BackgroundRemoval => "background_removal",
            Mode::Draw => "draw",
            Mode::Video => "video",
            Mode::HistoryView => "history_view",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| format!("unknown mode '{raw}'"))
    }
}

/// Which draft prompt an advisor merge writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSlot {
    Generate,
    Scene,
    Video,
}

/// Reference uploads for flat generation. Holds at most
/// [`MAX_REFERENCE_IMAGES`] images and at most one placeholder, always first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceList {
    images: Vec<UploadedImage>,
}

impl ReferenceList {
    pub fn as_slice(&self) -> &[UploadedImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn placeholder(&self) -> Option<&UploadedImage> {
        self.images.first().filter(|image| image.is_placeholder)
    }

    pub fn uploads(&self) -> impl Iterator<Item = &UploadedImage> {
        self.images.iter().filter(|image| !image.is_placeholder)
    }

    pub fn has_uploads(&self) -> bool {
        self.uploads().next().is_some()
    }

    /// Appends user uploads after any placeholder. Placeholder-flagged inputs
    /// are ignored; only [`ReferenceList::set_placeholder`] installs one.
    pub fn upload(&mut self, incoming: impl IntoIterator<Item = UploadedImage>) {
        self.images
            .extend(incoming.into_iter().filter(|image| !image.is_placeholder));
        self.images.truncate(MAX_REFERENCE_IMAGES);
    }

    pub fn set_placeholder(&mut self, mut placeholder: UploadedImage) {
        placeholder.is_placeholder = true;
        self.images.retain(|image| !image.is_placeholder);
        self.images.insert(0, placeholder);
        self.images.truncate(MAX_REFERENCE_IMAGES);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.images.len();
        self.images.retain(|image| image.id != id);
        self.images.len() != before
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

/// Structured-scene attribute fields; `None` means unspecified or auto-detect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAttributes {
    pub hair_style: Option<String>,
    pub hair_color: Option<String>,
    pub expression: Option<String>,
    pub headwear: Option<String>,
    pub outerwear: Option<String>,
    pub innerwear: Option<String>,
    pub legwear: Option<String>,
    pub footwear: Option<String>,
    pub face_cyberware: Option<String>,
    pub body_cyberware: Option<String>,
    pub life_path: Option<String>,
}

impl CharacterAttributes {
    pub const LABELS: [&'static str; 11] = [
        "Hair Style",
        "Hair Color",
        "Expression",
        "Headwear",
        "Outerwear",
        "Innerwear",
        "Legwear",
        "Footwear",
        "Face Cyberware",
        "Body Cyberware",
        "Life Path",
    ];

    fn fields(&self) -> [&Option<String>; 11] {
        [
            &self.hair_style,
            &self.hair_color,
            &self.expression,
            &self.headwear,
            &self.outerwear,
            &self.innerwear,
            &self.legwear,
            &self.footwear,
            &self.face_cyberware,
            &self.body_cyberware,
            &self.life_path,
        ]
    }

    /// `(label, value)` for every specified field, in prompt order.
    pub fn specified(&self) -> Vec<(&'static str, &str)> {
        Self::LABELS
            .into_iter()
            .zip(self.fields())
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| (label, value))
            })
            .collect()
    }

    /// Sets a field by its prompt label (case-insensitive, `_`/`-` tolerant).
    pub fn set(&mut self, label: &str, value: Option<String>) -> Result<(), String> {
        let wanted = label.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let slot = match wanted.as_str() {
            "hair style" => &mut self.hair_style,
            "hair color" => &mut self.hair_color,
            "expression" => &mut self.expression,
            "headwear" => &mut self.headwear,
            "outerwear" => &mut self.outerwear,
            "innerwear" => &mut self.innerwear,
            "legwear" => &mut self.legwear,
            "footwear" => &mut self.footwear,
            "face cyberware" => &mut self.face_cyberware,
            "body cyberware" => &mut self.body_cyberware,
            "life path" => &mut self.life_path,
            _ => return Err(format!("unknown attribute '{label}'")),
        };
        *slot = value;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateDraft {
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub references: ReferenceList,
    /// Last fragment inserted by "inspire", replaced on the next inspiration.
    pub inspired_fragment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDraft {
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub character: Option<UploadedImage>,
    pub custom_weapons: Vec<UploadedImage>,
    pub custom_companions: Vec<UploadedImage>,
    pub attributes: CharacterAttributes,
    pub weapon: Option<String>,
    pub vehicle: Option<String>,
    pub companion: Option<String>,
    pub scenes: Vec<String>,
    pub director: DirectorChoice,
    pub mission: MissionChoice,
    pub cinematic: bool,
    pub placeholder: Option<UploadedImage>,
    pub inspired_fragment: Option<String>,
}

impl SceneDraft {
    /// Non-placeholder character upload, the trigger for facial replication.
    pub fn character_upload(&self) -> Option<&UploadedImage> {
        self.character.as_ref().filter(|image| !image.is_placeholder)
    }

    pub fn has_subject(&self) -> bool {
        !self.prompt.trim().is_empty() || self.character.is_some()
    }

    pub fn has_custom_weapon_upload(&self) -> bool {
        self.custom_weapons.iter().any(|image| !image.is_placeholder)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackgroundRemovalDraft {
    pub image: Option<UploadedImage>,
    pub green_screen: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawDraft {
    pub aspect_ratio: Option<AspectRatio>,
    pub brush_size: u32,
    pub stroke_color: String,
    pub fill_color: String,
    pub background_color: String,
    pub background: Option<UploadedImage>,
}

impl Default for DrawDraft {
    fn default() -> Self {
        Self {
            aspect_ratio: None,
            brush_size: DEFAULT_BRUSH_SIZE,
            stroke_color: "#FFFFFF".to_string(),
            fill_color: "transparent".to_string(),
            background_color: "#808080".to_string(),
            background: None,
        }
    }
}

impl DrawDraft {
    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    pub fn grow_brush(&mut self) {
        self.set_brush_size(self.brush_size.saturating_add(1));
    }

    pub fn shrink_brush(&mut self) {
        self.set_brush_size(self.brush_size.saturating_sub(1));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDraft {
    pub prompt: String,
    pub start_frame: Option<UploadedImage>,
    pub end_frame: Option<UploadedImage>,
    pub aspect_ratio: Option<VideoAspectRatio>,
    pub duration_secs: u32,
    pub director: DirectorChoice,
}

impl Default for VideoDraft {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            start_frame: None,
            end_frame: None,
            aspect_ratio: None,
            duration_secs: DEFAULT_VIDEO_DURATION_SECS,
            director: DirectorChoice::Random,
        }
    }
}

impl VideoDraft {
    /// Copies the editable fields into a dispatchable parameter set.
    pub fn to_params(&self) -> VeoParams {
        VeoParams {
            prompt: self.prompt.clone(),
            start_frame: self.start_frame.clone(),
            end_frame: self.end_frame.clone(),
            aspect_ratio: self.aspect_ratio,
            duration_secs: self.duration_secs,
        }
    }

    pub fn restore_from(&mut self, params: &VeoParams) {
        self.prompt = params.prompt.clone();
        self.start_frame = params.start_frame.clone();
        self.end_frame = params.end_frame.clone();
        if let Some(ratio) = params.aspect_ratio {
            self.aspect_ratio = Some(ratio);
        }
        self.duration_secs = params.duration_secs;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrame {
    Start,
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryView {
    pub selected: Option<String>,
}

/// Everything the user is editing, one independent slot per mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub mode: Mode,
    pub generate: GenerateDraft,
    pub scene: SceneDraft,
    pub removal: BackgroundRemovalDraft,
    pub draw: DrawDraft,
    pub video: VideoDraft,
    pub history_view: HistoryView,
}

impl Session {
    pub fn switch_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Resets the active mode's slot and nothing else.
    pub fn clear_current(&mut self) {
        match self.mode {
            Mode::Generate => self.generate = GenerateDraft::default(),
            Mode::StructuredScene => self.scene = SceneDraft::default(),
            Mode::BackgroundRemoval => self.removal = BackgroundRemovalDraft::default(),
            Mode::Draw => self.draw = DrawDraft::default(),
            Mode::Video => self.video = VideoDraft::default(),
            Mode::HistoryView => self.history_view = HistoryView::default(),
        }
    }

    /// Applies a canvas ratio to the active image draft. The draw slot always
    /// mirrors it and the scene draft keeps the matching placeholder.
    pub fn select_aspect_ratio(&mut self, ratio: AspectRatio, placeholder: UploadedImage) {
        if self.mode == Mode::StructuredScene {
            self.scene.aspect_ratio = Some(ratio);
        } else {
            self.generate.aspect_ratio = Some(ratio);
        }
        self.draw.aspect_ratio = Some(ratio);
        if self.mode == Mode::Generate {
            self.generate.references.set_placeholder(placeholder.clone());
        }
        self.scene.placeholder = Some(placeholder);
    }

    pub fn prompt_mut(&mut self, slot: PromptSlot) -> &mut String {
        match slot {
            PromptSlot::Generate => &mut self.generate.prompt,
            PromptSlot::Scene => &mut self.scene.prompt,
            PromptSlot::Video => &mut self.video.prompt,
        }
    }

    pub fn prompt(&self, slot: PromptSlot) -> &str {
        match slot {
            PromptSlot::Generate => &self.generate.prompt,
            PromptSlot::Scene => &self.scene.prompt,
            PromptSlot::Video => &self.video.prompt,
        }
    }

    /// Prompt the optimize/inspire helpers act on for the current mode.
    pub fn active_prompt_slot(&self) -> PromptSlot {
        match self.mode {
            Mode::StructuredScene => PromptSlot::Scene,
            Mode::Video => PromptSlot::Video,
            _ => PromptSlot::Generate,
        }
    }
}

/// Appends uploads to a custom weapon or companion list, capped at
/// [`MAX_CUSTOM_IMAGES`].
pub fn push_custom_images(list: &mut Vec<UploadedImage>, incoming: Vec<UploadedImage>) {
    list.extend(incoming);
    list.truncate(MAX_CUSTOM_IMAGES);
}

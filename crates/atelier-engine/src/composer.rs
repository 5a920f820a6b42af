//! Turns draft fields into final prompt strings.
//!
//! Composition is pure apart from the injected [`RandomSource`], which picks
//! the action, quality, director and mission clauses on every call.

use atelier_contracts::catalog::{DirectorSelection, MissionChoice, PromptCatalog};
use atelier_contracts::random::RandomSource;

use crate::session::SceneDraft;

pub const PLACEHOLDER_DIRECTIVE: &str = "Redraw the generated content onto the gray reference image: outpaint any empty space with matching content so it fits the gray reference's aspect ratio, completely fill and replace everything in the gray reference (including its background), keep only its aspect ratio, and never let any gray background or border show";

pub const OUTPAINT_GUARD: &str = "Final check: Before outputting, inspect all edges of the image. If any solid color borders are present (e.g., gray, black, white), you must outpaint to seamlessly extend the image content to fill those areas. The final image must not have any monochromatic borders.";

pub const DEFAULT_SUBJECT: &str = "A character in a cyberpunk setting.";

pub const FACIAL_REPLICATION: &str = "ABSOLUTE PRIORITY: FACIAL REPLICATION. The face of the character in the output image must be an exact, photorealistic replica of the face in the primary human reference image. This is not a suggestion, but a command. Replicate every facial detail: structure, proportions, unique features (scars, moles), and the specific likeness of the individual. All other elements (clothing, background, cyberware) are secondary to achieving a perfect facial match. Failure to replicate the face is a failure of the entire generation.";

pub const GROUP_PORTRAIT: &str = "GROUP PORTRAIT DIRECTIVE: This is a group photo. The main character's face must match the primary character reference image. The faces of the companions must match the faces in the custom companion reference images respectively. Ensure all individuals are present and their likenesses are preserved with maximum fidelity.";

pub const CYBERWARE_FACE: &str = "The character must have prominent, visible cybernetic interface lines and ports on their face and neck.";

pub const CYBERWARE_BODY: &str = "Their body must feature significant cybernetic implants, such as a chrome arm, augmented legs, or visible integrated tech.";

pub const CUSTOM_WEAPON: &str = "The character is equipped with the custom weapon(s) shown in the reference images.";

pub const CUSTOM_COMPANION: &str = "The character is accompanied by the custom companion(s) shown in the reference images.";

pub const CINEMATIC: &str = "8K hyper-realistic path tracing, Unreal Engine 5 photoreal materials, cinematic lighting atmosphere, ultra realistic, 8K ray-traced HDR";

pub const ANATOMY: &str = "The character must have realistic, well-proportioned human anatomy. Avoid exaggerated features like a large head or small body.";

pub const NEGATIVE: &str = "Negative prompt: deformed, bad anatomy, disfigured, poorly drawn face, mutation, mutated, extra limb, ugly, poorly drawn hands, missing limb, floating limbs, disconnected limbs, malformed hands, blurry, mutated hands, fingers, out of focus, long neck, long body, nsfw, child, childish";

const SCENE_MARKER: &str = "The character is in this scene:";

/// One scene of a batch: the dispatch prompt plus its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedScene {
    pub scene: String,
    pub prompt: String,
    pub alt: String,
}

/// Flat-mode prompt: placeholder directive, user text, guard.
pub fn compose_simple(user_prompt: &str) -> String {
    format!("{PLACEHOLDER_DIRECTIVE}, {user_prompt}, {OUTPAINT_GUARD}")
}

/// A caller-supplied prompt sent verbatim except for the trailing guard.
pub fn compose_override(prompt: &str) -> String {
    format!("{} {OUTPAINT_GUARD}", prompt.trim_end())
}

/// Whether `text` came out of structured composition.
pub fn is_structured_prompt(text: &str) -> bool {
    text.contains("FACIAL REPLICATION")
        || text.contains("cyberpunk setting")
        || text.contains(SCENE_MARKER)
}

/// Appends the cinematic-quality clause to an existing prompt.
pub fn with_cinematic(prompt: &str) -> String {
    if prompt.trim().is_empty() {
        CINEMATIC.to_string()
    } else {
        format!("{prompt}, {CINEMATIC}")
    }
}

pub struct PromptComposer<'a> {
    catalog: &'a PromptCatalog,
}

impl<'a> PromptComposer<'a> {
    pub fn new(catalog: &'a PromptCatalog) -> Self {
        Self { catalog }
    }

    /// Single-unit structured prompt.
    pub fn structured(&self, draft: &SceneDraft, rng: &mut dyn RandomSource) -> String {
        let base = self.base(draft, rng);
        let director = draft.director.resolve(self.catalog, rng);
        let mut clauses = vec![base];
        clauses.extend(director.map(|selection| selection.style.prompt));
        clauses.push(OUTPAINT_GUARD.to_string());
        clauses.join(" ")
    }

    /// Per-scene prompt; every random clause is drawn again for each scene.
    pub fn scene(&self, draft: &SceneDraft, scene: &str, rng: &mut dyn RandomSource) -> ComposedScene {
        let base = self.base(draft, rng);
        let director = draft.director.resolve(self.catalog, rng);
        let mission = draft.mission.resolve(self.catalog, rng);
        let description = self
            .catalog
            .scene(scene)
            .map(|spec| spec.description.clone())
            .unwrap_or_else(|| format!("A scene in {scene}."));

        let mut clauses = vec![base];
        clauses.extend(director.as_ref().map(|selection| selection.style.prompt.clone()));
        clauses.push(format!("{SCENE_MARKER} {}", terminated(&description)));
        if let Some(mission) = mission.as_deref() {
            clauses.push(format!("Narrative Focus: {}", terminated(mission)));
        }
        clauses.push(OUTPAINT_GUARD.to_string());

        ComposedScene {
            scene: scene.to_string(),
            prompt: clauses.join(" "),
            alt: self.caption(draft, scene, director.as_ref()),
        }
    }

    pub fn scenes(
        &self,
        draft: &SceneDraft,
        scenes: &[String],
        rng: &mut dyn RandomSource,
    ) -> Vec<ComposedScene> {
        scenes
            .iter()
            .map(|scene| self.scene(draft, scene, rng))
            .collect()
    }

    /// Clauses 1 through 8: placeholder directive, subject, attributes,
    /// equipment, companion, cinematic, anatomy, negative, action, visuals.
    fn base(&self, draft: &SceneDraft, rng: &mut dyn RandomSource) -> String {
        let mut parts: Vec<String> = Vec::new();

        let subject = draft.prompt.trim();
        parts.push(if subject.is_empty() {
            DEFAULT_SUBJECT.to_string()
        } else {
            subject.to_string()
        });
        if draft.character_upload().is_some() {
            parts.push(FACIAL_REPLICATION.to_string());
            if !draft.custom_companions.is_empty() {
                parts.push(GROUP_PORTRAIT.to_string());
            }
        } else {
            parts.push(CYBERWARE_FACE.to_string());
            parts.push(CYBERWARE_BODY.to_string());
        }

        for (label, value) in draft.attributes.specified() {
            parts.push(format!("{label}: {value}"));
        }

        if let Some(weapon) = specified(&draft.weapon) {
            parts.push(format!("Wielding weapon: {weapon}"));
        }
        if let Some(vehicle) = specified(&draft.vehicle) {
            parts.push(format!("Driving or posing with vehicle: {vehicle}"));
        }
        if draft.has_custom_weapon_upload() {
            parts.push(CUSTOM_WEAPON.to_string());
        }

        if let Some(companion) = specified(&draft.companion) {
            match self.catalog.companion(companion) {
                Some(description) => parts.push(format!(
                    "With a companion who is an exact match to this description: {description}"
                )),
                None => parts.push(format!("With companion: {companion}")),
            }
        }
        if !draft.custom_companions.is_empty() && draft.character.is_none() {
            parts.push(CUSTOM_COMPANION.to_string());
        }

        if draft.cinematic {
            parts.push(CINEMATIC.to_string());
        }
        parts.push(ANATOMY.to_string());
        parts.push(NEGATIVE.to_string());

        let mut base = format!("{PLACEHOLDER_DIRECTIVE}, {}.", parts.join(", "));
        if let Some(action) = self.catalog.random_action(rng) {
            base.push_str(&format!(" Action: {action}."));
        }
        if let Some(quality) = self.catalog.random_quality(rng) {
            base.push_str(&format!(" Visuals: {quality}."));
        }
        base
    }

    fn caption(&self, draft: &SceneDraft, scene: &str, director: Option<&DirectorSelection>) -> String {
        let mut parts = vec![scene.to_string()];
        if let Some(weapon) = specified(&draft.weapon) {
            parts.push(format!("Weapon: {weapon}"));
        }
        if let Some(vehicle) = specified(&draft.vehicle) {
            parts.push(format!("Vehicle: {vehicle}"));
        }
        if let Some(companion) = specified(&draft.companion) {
            parts.push(format!("Companion: {companion}"));
        }
        let director_label = match director {
            Some(selection) => selection.caption(),
            None => first_word(draft.director.label()).to_string(),
        };
        parts.push(format!("Director: {director_label}"));
        let mission_label = match &draft.mission {
            MissionChoice::Random => "Random".to_string(),
            MissionChoice::Explicit(text) => text.chars().take(10).collect(),
        };
        parts.push(format!("Mission: {mission_label}"));
        parts.join(" | ")
    }
}

fn specified(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or(text)
}

fn terminated(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

use indexmap::IndexMap;

use crate::random::{choose, RandomSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorStyle {
    pub name: String,
    pub prompt: String,
}

impl DirectorStyle {
    /// First word of the name, used in compact captions.
    pub fn short_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneDistrict {
    City,
    Outskirts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSpec {
    pub key: String,
    pub district: SceneDistrict,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionCategory {
    pub name: String,
    pub options: Vec<String>,
}

/// Canned clauses the prompt composer draws from.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    directors: IndexMap<String, DirectorStyle>,
    scenes: IndexMap<String, SceneSpec>,
    missions: Vec<MissionCategory>,
    companions: IndexMap<String, String>,
    actions: Vec<String>,
    qualities: Vec<String>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self {
            directors: default_directors(),
            scenes: default_scenes(),
            missions: default_missions(),
            companions: default_companions(),
            actions: to_strings(DYNAMIC_ACTIONS),
            qualities: to_strings(IMMERSIVE_QUALITIES),
        }
    }
}

impl PromptCatalog {
    pub fn new(
        directors: Vec<DirectorStyle>,
        scenes: Vec<SceneSpec>,
        missions: Vec<MissionCategory>,
        companions: IndexMap<String, String>,
        actions: Vec<String>,
        qualities: Vec<String>,
    ) -> Self {
        Self {
            directors: directors
                .into_iter()
                .map(|style| (style.name.clone(), style))
                .collect(),
            scenes: scenes
                .into_iter()
                .map(|scene| (scene.key.clone(), scene))
                .collect(),
            missions,
            companions,
            actions,
            qualities,
        }
    }

    pub fn director(&self, name: &str) -> Option<&DirectorStyle> {
        self.directors.get(name)
    }

    pub fn directors(&self) -> impl Iterator<Item = &DirectorStyle> {
        self.directors.values()
    }

    pub fn random_director(&self, rng: &mut dyn RandomSource) -> Option<&DirectorStyle> {
        if self.directors.is_empty() {
            return None;
        }
        self.directors
            .get_index(rng.pick(self.directors.len()))
            .map(|(_, style)| style)
    }

    pub fn scene(&self, key: &str) -> Option<&SceneSpec> {
        self.scenes.get(key)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &SceneSpec> {
        self.scenes.values()
    }

    pub fn scene_keys(&self) -> Vec<String> {
        self.scenes.keys().cloned().collect()
    }

    pub fn scenes_in(&self, district: SceneDistrict) -> Vec<&SceneSpec> {
        self.scenes
            .values()
            .filter(|scene| scene.district == district)
            .collect()
    }

    pub fn missions(&self) -> &[MissionCategory] {
        &self.missions
    }

    pub fn all_missions(&self) -> Vec<&str> {
        self.missions
            .iter()
            .flat_map(|category| category.options.iter().map(String::as_str))
            .collect()
    }

    pub fn companion(&self, name: &str) -> Option<&str> {
        self.companions.get(name).map(String::as_str)
    }

    pub fn companion_names(&self) -> impl Iterator<Item = &str> {
        self.companions.keys().map(String::as_str)
    }

    pub fn random_action(&self, rng: &mut dyn RandomSource) -> Option<&str> {
        choose(rng, &self.actions).map(String::as_str)
    }

    pub fn random_quality(&self, rng: &mut dyn RandomSource) -> Option<&str> {
        choose(rng, &self.qualities).map(String::as_str)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

fn default_directors() -> IndexMap<String, DirectorStyle> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, prompt: &str| {
        map.insert(
            name.to_string(),
            DirectorStyle {
                name: name.to_string(),
                prompt: prompt.to_string(),
            },
        );
    };

    insert(
        "Ridley Scott",
        "Directed in the style of Ridley Scott: rain-soaked neo-noir, towering industrial architecture, smoky shafts of light and a melancholic, monumental scale.",
    );
    insert(
        "Denis Villeneuve",
        "Directed in the style of Denis Villeneuve: vast minimalist compositions, muted monochrome palettes, heavy atmosphere and lone figures dwarfed by brutalist space.",
    );
    insert(
        "Wong Kar-wai",
        "Directed in the style of Wong Kar-wai: saturated neon reds and greens, step-printed motion blur, intimate close framing and lonely romantic longing.",
    );
    insert(
        "Michael Mann",
        "Directed in the style of Michael Mann: cool digital night photography, sodium-vapour city glow, tactical realism and precise, professional body language.",
    );
    insert(
        "Mamoru Oshii",
        "Directed in the style of Mamoru Oshii: contemplative cyber-philosophy, reflective water and glass, layered city signage and quiet, watchful stillness.",
    );
    insert(
        "Nicolas Winding Refn",
        "Directed in the style of Nicolas Winding Refn: hypnotic magenta and cyan lighting, symmetrical framing, slow menace and synth-wave cool.",
    );
    insert(
        "Stanley Kubrick",
        "Directed in the style of Stanley Kubrick: one-point perspective, cold clinical symmetry, wide-angle distortion and an unsettling, deliberate calm.",
    );
    insert(
        "Katsuhiro Otomo",
        "Directed in the style of Katsuhiro Otomo: hyper-detailed urban decay, kinetic motorcycle energy, explosive light trails and dense mechanical texture.",
    );

    map
}

fn default_scenes() -> IndexMap<String, SceneSpec> {
    let mut map = IndexMap::new();

    let mut insert = |key: &str, district: SceneDistrict, description: &str| {
        map.insert(
            key.to_string(),
            SceneSpec {
                key: key.to_string(),
                district,
                description: description.to_string(),
            },
        );
    };

    insert(
        "Neon Market",
        SceneDistrict::City,
        "A crowded night market under stacked holographic billboards, steam rising from noodle stalls and crowds lit in pink and cyan.",
    );
    insert(
        "Corporate Plaza",
        SceneDistrict::City,
        "A sterile corporate plaza of glass and chrome, armed security drones overhead and a megatower disappearing into the smog.",
    );
    insert(
        "Rain-Slick Alley",
        SceneDistrict::City,
        "A narrow alley slick with rain, flickering kanji signs, tangled cables and puddles reflecting neon light.",
    );
    insert(
        "Rooftop Helipad",
        SceneDistrict::City,
        "A windswept rooftop helipad high above the skyline, warning beacons blinking and an aerodyne lifting off in the background.",
    );
    insert(
        "Underground Club",
        SceneDistrict::City,
        "A packed underground club with laser grids, bass-heavy haze and dancers with glowing subdermal implants.",
    );
    insert(
        "Ripperdoc Clinic",
        SceneDistrict::City,
        "A cramped back-room cyberware clinic, surgical arms, chrome limbs on racks and green diagnostic light.",
    );
    insert(
        "Monorail Station",
        SceneDistrict::City,
        "An elevated monorail platform at rush hour, commuters in smart fabrics and an incoming train streaking light.",
    );
    insert(
        "Scrapyard Fortress",
        SceneDistrict::Outskirts,
        "A walled scrapyard fortress built from shipping containers and wrecked vehicles, floodlights sweeping the dust.",
    );
    insert(
        "Black Market Bazaar",
        SceneDistrict::Outskirts,
        "A lawless bazaar inside a gutted stadium, makeshift stalls selling military cyberware under tarps and string lights.",
    );
    insert(
        "Desert Highway",
        SceneDistrict::Outskirts,
        "A cracked desert highway at dusk, wind turbines on the horizon and a convoy of armored nomad trucks.",
    );

    map
}

fn default_missions() -> Vec<MissionCategory> {
    let category = |name: &str, options: &[&str]| MissionCategory {
        name: name.to_string(),
        options: to_strings(options),
    };
    vec![
        category(
            "Combat",
            &[
                "Holding the line against a corporate strike team",
                "A tense standoff moments before the first shot",
                "Escaping a firefight with a wounded ally",
            ],
        ),
        category(
            "Infiltration",
            &[
                "Slipping past security to steal a data shard",
                "Jacking into a secure terminal while the clock runs down",
                "Posing as a guest at an exclusive corporate gala",
            ],
        ),
        category(
            "Street Life",
            &[
                "Negotiating a deal with a shady fixer",
                "A quiet moment of rest after a long job",
                "Celebrating a successful gig with the crew",
            ],
        ),
    ]
}

fn default_companions() -> IndexMap<String, String> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, description: &str| {
        map.insert(name.to_string(), description.to_string());
    };

    insert(
        "Netrunner",
        "a lean netrunner in a cooling bodysuit, neural link cables trailing from the base of the skull, eyes glowing with data overlays",
    );
    insert(
        "Nomad Driver",
        "a sun-weathered nomad driver in a patched leather jacket, goggles on the forehead and a mechanical left arm",
    );
    insert(
        "Corporate Fixer",
        "a sharply dressed fixer in a tailored suit with subtle chrome accents at the temples and a confident smirk",
    );
    insert(
        "Street Samurai",
        "a street samurai with a mono-katana on the back, armored coat and optical implants replacing both eyes",
    );
    insert(
        "Rogue Android",
        "a humanoid android with a cracked synthetic skin panel revealing the chassis beneath, calm and unreadable",
    );

    map
}

const DYNAMIC_ACTIONS: &[&str] = &[
    "mid-stride toward the camera with a coat flaring in the wind",
    "crouched behind cover, checking the surroundings",
    "leaning against a wall and lighting a cigarette",
    "turning sharply over the shoulder toward a sound",
    "vaulting over an obstacle in a burst of motion",
    "standing tall in a confident hero pose",
    "reaching toward the lens with an outstretched hand",
    "walking away from an explosion without looking back",
];

const IMMERSIVE_QUALITIES: &[&str] = &[
    "volumetric fog, cinematic depth of field, photoreal skin texture",
    "anamorphic lens flares, rich contrast, film grain",
    "high dynamic range, crisp micro detail, realistic reflections",
    "moody rim lighting, shallow focus, atmospheric haze",
    "golden-hour spill light, vivid color grading, sharp focus",
    "wet surfaces with neon reflections, dramatic shadows, ultra detailed",
];

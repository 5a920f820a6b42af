mod registry;
mod selectors;

pub use registry::{DirectorStyle, MissionCategory, PromptCatalog, SceneDistrict, SceneSpec};
pub use selectors::{DirectorChoice, DirectorSelection, MissionChoice};

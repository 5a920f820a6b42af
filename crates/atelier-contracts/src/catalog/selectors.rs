use serde::{Deserialize, Serialize};

use super::registry::{DirectorStyle, PromptCatalog};
use crate::random::{choose, RandomSource};

/// Director picker state. `Random` draws uniformly on every resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum DirectorChoice {
    #[default]
    Random,
    Named(String),
}

impl DirectorChoice {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn is_random(&self) -> bool {
        matches!(self, Self::Random)
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Random => "Random",
            Self::Named(name) => name,
        }
    }

    /// Resolves to a concrete style. A named director missing from the catalog
    /// resolves to `None` and contributes no clause.
    pub fn resolve(
        &self,
        catalog: &PromptCatalog,
        rng: &mut dyn RandomSource,
    ) -> Option<DirectorSelection> {
        match self {
            Self::Random => catalog
                .random_director(rng)
                .map(|style| DirectorSelection {
                    style: style.clone(),
                    randomized: true,
                }),
            Self::Named(name) => catalog.director(name).map(|style| DirectorSelection {
                style: style.clone(),
                randomized: false,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorSelection {
    pub style: DirectorStyle,
    pub randomized: bool,
}

impl DirectorSelection {
    pub fn caption(&self) -> String {
        if self.randomized {
            format!("Random ({})", self.style.short_name())
        } else {
            self.style.short_name().to_string()
        }
    }
}

/// Mission picker state. `Random` draws from every category on each resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum MissionChoice {
    #[default]
    Random,
    Explicit(String),
}

impl MissionChoice {
    pub fn explicit(text: impl Into<String>) -> Self {
        Self::Explicit(text.into())
    }

    pub fn resolve(&self, catalog: &PromptCatalog, rng: &mut dyn RandomSource) -> Option<String> {
        match self {
            Self::Explicit(text) => Some(text.clone()),
            Self::Random => choose(rng, &catalog.all_missions()).map(|text| (*text).to_string()),
        }
    }
}

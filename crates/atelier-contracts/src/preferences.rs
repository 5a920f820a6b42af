use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{DurableStorage, StorageError};

pub const THEME_KEY: &str = "app-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Cyberpunk,
    Classic,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cyberpunk => "cyberpunk",
            Self::Classic => "classic",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Cyberpunk => Self::Classic,
            Self::Classic => Self::Cyberpunk,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cyberpunk" => Ok(Self::Cyberpunk),
            "classic" => Ok(Self::Classic),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

/// Theme record kept under [`THEME_KEY`] as a bare string.
#[derive(Clone)]
pub struct PreferenceStore {
    storage: Arc<dyn DurableStorage>,
}

impl PreferenceStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Unknown or unreadable values fall back to the default theme.
    pub fn theme(&self) -> Theme {
        self.storage
            .read(THEME_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StorageError> {
        self.storage.write(THEME_KEY, theme.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStorage;

    use super::*;

    #[test]
    fn theme_defaults_to_cyberpunk_and_persists() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let prefs = PreferenceStore::new(storage.clone());
        assert_eq!(prefs.theme(), Theme::Cyberpunk);

        prefs.set_theme(Theme::Classic)?;
        assert_eq!(storage.read(THEME_KEY)?.as_deref(), Some("classic"));
        assert_eq!(prefs.theme(), Theme::Classic);
        Ok(())
    }

    #[test]
    fn garbage_theme_value_falls_back() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(THEME_KEY, "vaporwave")?;
        assert_eq!(PreferenceStore::new(storage).theme(), Theme::Cyberpunk);
        assert_eq!(Theme::Classic.toggled(), Theme::Cyberpunk);
        Ok(())
    }
}

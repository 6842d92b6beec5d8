use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::domain::household_member;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_user: Option<String>,
}

/// Which household member this device acts as, kept in a small TOML file.
///
/// A missing file or key means nobody has been selected yet.
#[derive(Debug, Clone)]
pub struct SelectedUserStore {
    path: PathBuf,
}

impl SelectedUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read preferences '{}'", self.path.display())
                })
            }
        };
        let file: PreferencesFile = toml::from_str(&raw)
            .with_context(|| format!("invalid preferences file '{}'", self.path.display()))?;
        Ok(file
            .selected_user
            .filter(|name| !name.trim().is_empty()))
    }

    /// Persists `name` after resolving it against the household list.
    pub fn save(&self, name: &str) -> Result<String> {
        let member = household_member(name)?;
        self.write(&PreferencesFile {
            selected_user: Some(member.to_string()),
        })?;
        Ok(member.to_string())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to remove preferences '{}'", self.path.display())
            }),
        }
    }

    fn write(&self, file: &PreferencesFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create preferences directory '{}'", parent.display())
            })?;
        }
        let raw = toml::to_string(file).context("failed to encode preferences")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write preferences '{}'", self.path.display()))
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spirit_core::write_text_atomic;

use crate::SessionTemplate;

#[derive(Debug, Clone)]
/// On-disk home of the authenticated session template.
pub struct SessionTemplateStore {
    path: PathBuf,
}

impl SessionTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<SessionTemplate> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session template {}", self.path.display()))?;
        let template = serde_json::from_str::<SessionTemplate>(&raw).with_context(|| {
            format!("failed to parse session template {}", self.path.display())
        })?;
        Ok(template)
    }

    pub fn save(&self, template: &SessionTemplate) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(template).context("failed to encode session template")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write session template {}", self.path.display()))
    }
}

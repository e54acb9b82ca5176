use anyhow::Context;
use harness::{EngineBindings, ReadyPolicy, SessionConfig, VariantKind};
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Defaults read from a RON file. Anything left out falls back to the
/// built in per variant setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub root: Option<PathBuf>,
    pub page: Option<String>,
    pub ready: Option<ReadyPolicy>,
    pub chrome: Option<PathBuf>,
    pub seed: Option<u64>,
    pub bindings: Option<EngineBindings>,
    /// Keyed by variant name, e.g. `"minimal-rom"`.
    pub variants: BTreeMap<String, VariantConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub port: Option<u16>,
    pub rom: Option<PathBuf>,
}

impl HarnessConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config = ron::from_str(text)?;
        Ok(config)
    }

    pub fn session(&self, kind: VariantKind) -> SessionConfig {
        let mut session = SessionConfig::new(kind);

        if let Some(root) = &self.root {
            session.root = root.clone();
        }
        if let Some(page) = &self.page {
            session.page = page.clone();
        }
        if let Some(ready) = self.ready {
            session.ready = ready;
        }
        if let Some(bindings) = &self.bindings {
            session.bindings = bindings.clone();
        }

        let variant = self.variants.get(kind.name());
        if let Some(port) = variant.and_then(|v| v.port) {
            session.port = port;
        }
        session.rom_path = match variant.and_then(|v| v.rom.clone()) {
            Some(rom) => rom,
            None => session.root.join(kind.default_rom()),
        };

        session
    }
}

//! Configuration for sheet decoding

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// What to do when a row fails to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the whole stream on the first failing row
    #[default]
    Strict,
    /// Report the failing row, skip it and continue with the next one
    BestEffort,
}

/// Settings for one decoder instance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Pad each row after the first non-empty one to the reference width plus one
    pub pad_to_reference_width: bool,
    pub error_policy: ErrorPolicy,
    /// Also notify the sink for cells missing between present ones
    pub emit_blank_cells: bool,
}

impl DecoderConfig {
    pub fn with_padding(mut self, pad: bool) -> Self {
        self.pad_to_reference_width = pad;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_blank_cells(mut self, emit: bool) -> Self {
        self.emit_blank_cells = emit;
        self
    }
}

/// File-level configuration: defaults plus per-sheet overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub global: DecoderConfig,
    #[serde(default)]
    pub sheets: HashMap<String, SheetOverride>,
}

impl ReaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Effective settings for a sheet: sheet override -> global
    pub fn for_sheet(&self, sheet_name: &str) -> DecoderConfig {
        let mut config = self.global.clone();
        if let Some(sheet) = self.sheets.get(sheet_name) {
            if let Some(pad) = sheet.pad_to_reference_width {
                config.pad_to_reference_width = pad;
            }
            if let Some(policy) = sheet.error_policy {
                config.error_policy = policy;
            }
            if let Some(emit) = sheet.emit_blank_cells {
                config.emit_blank_cells = emit;
            }
        }
        config
    }
}

/// Sheet-specific settings; unset fields fall back to the global ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetOverride {
    #[serde(default)]
    pub pad_to_reference_width: Option<bool>,
    #[serde(default)]
    pub error_policy: Option<ErrorPolicy>,
    #[serde(default)]
    pub emit_blank_cells: Option<bool>,
}

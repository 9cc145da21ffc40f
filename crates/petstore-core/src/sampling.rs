//! Sampling parameter presets for the text-completion model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Preset returned by [`SamplingRegistry::get_or_default`] for unknown names.
pub const DEFAULT_PRESET: &str = "balanced";

/// Model sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling probability mass
    pub top_p: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Stop sequences
    #[serde(rename = "stop", default)]
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::preset(0.3, 0.9, 1500, 0.1, 0.1)
    }
}

impl SamplingConfig {
    const fn preset(
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
        frequency_penalty: f32,
        presence_penalty: f32,
    ) -> Self {
        Self {
            temperature,
            top_p,
            max_tokens,
            frequency_penalty,
            presence_penalty,
            stop_sequences: None,
        }
    }

    /// Set stop sequences.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = Some(stop);
        self
    }
}

/// Name-keyed collection of sampling presets.
#[derive(Debug, Clone, Default)]
pub struct SamplingRegistry {
    configs: HashMap<String, SamplingConfig>,
}

impl SamplingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in presets.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add("conservative", SamplingConfig::preset(0.1, 0.9, 1000, 0.0, 0.0));
        registry.add(DEFAULT_PRESET, SamplingConfig::default());
        registry.add("creative", SamplingConfig::preset(0.7, 0.95, 2000, 0.2, 0.2));
        registry.add("precise", SamplingConfig::preset(0.0, 1.0, 800, 0.0, 0.0));
        registry
    }

    /// Register a preset. An existing entry with the same name is replaced.
    pub fn add(&mut self, name: impl Into<String>, config: SamplingConfig) {
        self.configs.insert(name.into(), config);
    }

    /// Whether a preset is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// Look up a preset.
    pub fn get(&self, name: &str) -> Result<&SamplingConfig, Error> {
        self.configs
            .get(name)
            .ok_or_else(|| Error::UnknownPreset(name.to_string()))
    }

    /// Look up a preset, falling back to `balanced` (or the built-in default
    /// values when `balanced` was never registered).
    pub fn get_or_default(&self, name: &str) -> SamplingConfig {
        self.configs
            .get(name)
            .or_else(|| self.configs.get(DEFAULT_PRESET))
            .cloned()
            .unwrap_or_default()
    }

    /// Registered preset names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

//! Variant slots and their mode-to-chain mappings

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};

/// A named variant slot: each mode maps to an ordered chain of step
/// names spliced into the workflow where the slot sits.
///
/// Mode chains are rejected empty at registration and re-checked at
/// resolution, so a resolved slot always expands to at least one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    name: String,
    modes: HashMap<String, Vec<String>>,
}

impl Factor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modes: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register one mode and the step chain it expands to.
    pub fn add_mode(&mut self, mode: impl Into<String>, chain: Vec<String>) -> PipelineResult<()> {
        let mode = mode.into();
        if chain.is_empty() {
            return Err(PipelineError::EmptyMode {
                slot: self.name.clone(),
                mode,
            });
        }
        if self.modes.contains_key(&mode) {
            return Err(PipelineError::DuplicateMode {
                slot: self.name.clone(),
                mode,
            });
        }
        self.modes.insert(mode, chain);
        Ok(())
    }

    /// The step chain a mode expands to.
    pub fn chain_for(&self, mode: &str) -> PipelineResult<&[String]> {
        self.modes
            .get(mode)
            .map(Vec::as_slice)
            .ok_or_else(|| PipelineError::UnknownMode {
                slot: self.name.clone(),
                mode: mode.to_string(),
            })
    }

    pub fn mode_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The variant slots known to one runner.
#[derive(Debug, Clone, Default)]
pub struct FactorSet {
    factors: HashMap<String, Factor>,
}

impl FactorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, factor: Factor) -> PipelineResult<()> {
        let name = factor.name().to_string();
        if self.factors.contains_key(&name) {
            return Err(PipelineError::DuplicateFactor(name));
        }
        self.factors.insert(name, factor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> PipelineResult<&Factor> {
        self.factors
            .get(name)
            .ok_or_else(|| PipelineError::UnknownSlot(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

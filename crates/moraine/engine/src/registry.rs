//! Name-to-factory registry for processing steps

use std::collections::HashMap;
use std::fmt;

use moraine_types::{PipelineError, PipelineResult};
use tracing::info;

use crate::step::Step;

type StepFactory = Box<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Maps step names to factories producing fresh instances.
///
/// Workflows reference steps by name only, so swapping an implementation
/// means swapping a registration — no workflow changes. Each resolution
/// instantiates its own step objects; nothing is shared between runs.
#[derive(Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under a unique name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> PipelineResult<()>
    where
        F: Fn() -> Box<dyn Step> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(PipelineError::DuplicateStep(name));
        }
        info!(step = %name, "registered step");
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Produce a fresh instance of a registered step.
    pub fn instantiate(&self, name: &str) -> PipelineResult<Box<dyn Step>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.names())
            .finish()
    }
}

//! Experiments: immutable parameter sets for a run

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};
use crate::value::AttributeValue;

/// Parameter naming the iteration step size, in years. Every experiment
/// that drives a convergence loop must define it.
pub const TIMESTEP_PARAMETER: &str = "timestep";

/// A named, immutable set of run parameters.
///
/// An experiment carries two kinds of entries in one map: numeric and
/// text tuning parameters read by steps, and one mode selection per
/// variant slot of the workflow (keyed by slot name). It is frozen once
/// a run starts, so two runs of the same experiment see identical
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    name: String,
    parameters: HashMap<String, AttributeValue>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: HashMap::new(),
        }
    }

    /// Builder: set one parameter.
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.parameters.get(key)
    }

    /// Numeric parameter, if present and numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(AttributeValue::as_f64)
    }

    /// Numeric parameter that a step cannot run without.
    pub fn require_f64(&self, key: &str) -> PipelineResult<f64> {
        self.get_f64(key).ok_or_else(|| PipelineError::MissingParameter {
            parameter: key.to_string(),
        })
    }

    /// Text parameter, if present and textual.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(AttributeValue::as_str)
    }

    /// The mode this experiment selects for a variant slot, if any.
    pub fn mode_for(&self, slot: &str) -> Option<&str> {
        self.get_str(slot)
    }

    /// The iteration step size, in years.
    pub fn timestep(&self) -> PipelineResult<f64> {
        self.require_f64(TIMESTEP_PARAMETER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_access() {
        let experiment = Experiment::new("holocene")
            .with_parameter(TIMESTEP_PARAMETER, 10.0)
            .with_parameter("nuclide", "10Be")
            .with_parameter("geomagnetic model", "constant");

        assert_eq!(experiment.timestep().unwrap(), 10.0);
        assert_eq!(experiment.get_str("nuclide"), Some("10Be"));
        assert_eq!(experiment.mode_for("geomagnetic model"), Some("constant"));
        assert_eq!(experiment.mode_for("sea level model"), None);
    }

    #[test]
    fn test_missing_timestep_is_an_error() {
        let experiment = Experiment::new("bare");
        assert_eq!(
            experiment.timestep().unwrap_err(),
            PipelineError::MissingParameter {
                parameter: TIMESTEP_PARAMETER.to_string()
            }
        );
    }

    #[test]
    fn test_text_parameter_is_not_numeric() {
        let experiment = Experiment::new("e").with_parameter("nuclide", "10Be");
        assert_eq!(experiment.get_f64("nuclide"), None);
        assert!(experiment.require_f64("nuclide").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let experiment = Experiment::new("holocene")
            .with_parameter(TIMESTEP_PARAMETER, 10.0)
            .with_parameter("nuclide", "10Be")
            .with_parameter("sea level model", "eustatic");

        let json = serde_json::to_string(&experiment).unwrap();
        let back: Experiment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, experiment);
    }
}

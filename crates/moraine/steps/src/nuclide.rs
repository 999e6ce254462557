//! Physical constants for the supported cosmogenic nuclides
//!
//! Decay constants and production parameters follow the values commonly
//! used for terrestrial in-situ cosmogenic dating. Production for ³⁶Cl
//! is composition-dependent and has no single sea-level spallation rate,
//! so it is carried for decay purposes only.

use std::fmt;

use moraine_types::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// A cosmogenic nuclide Moraine can model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nuclide {
    #[serde(rename = "3He")]
    He3,
    #[serde(rename = "10Be")]
    Be10,
    #[serde(rename = "14C")]
    C14,
    #[serde(rename = "21Ne")]
    Ne21,
    #[serde(rename = "26Al")]
    Al26,
    #[serde(rename = "36Cl")]
    Cl36,
}

impl Nuclide {
    pub const ALL: [Nuclide; 6] = [
        Nuclide::He3,
        Nuclide::Be10,
        Nuclide::C14,
        Nuclide::Ne21,
        Nuclide::Al26,
        Nuclide::Cl36,
    ];

    /// The conventional isotope symbol, also used in experiment
    /// parameters and serialized forms.
    pub fn symbol(&self) -> &'static str {
        match self {
            Nuclide::He3 => "3He",
            Nuclide::Be10 => "10Be",
            Nuclide::C14 => "14C",
            Nuclide::Ne21 => "21Ne",
            Nuclide::Al26 => "26Al",
            Nuclide::Cl36 => "36Cl",
        }
    }

    pub fn from_symbol(symbol: &str) -> PipelineResult<Self> {
        match symbol {
            "3He" => Ok(Nuclide::He3),
            "10Be" => Ok(Nuclide::Be10),
            "14C" => Ok(Nuclide::C14),
            "21Ne" => Ok(Nuclide::Ne21),
            "26Al" => Ok(Nuclide::Al26),
            "36Cl" => Ok(Nuclide::Cl36),
            other => Err(PipelineError::UnknownNuclide(other.to_string())),
        }
    }

    /// Radioactive decay constant, per year. Zero for stable nuclides.
    pub fn decay_constant(&self) -> f64 {
        match self {
            Nuclide::He3 => 0.0,
            Nuclide::Be10 => 4.590_378_807_947_0e-7,
            Nuclide::C14 => 0.000_120_968,
            Nuclide::Ne21 => 0.0,
            Nuclide::Al26 => 9.680_826_54e-7,
            Nuclide::Cl36 => 2.302_81e-6,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.decay_constant() == 0.0
    }

    /// Sea-level, high-latitude spallation production rate in
    /// atoms per gram per year. `None` where no single reference rate
    /// exists.
    pub fn spallation_rate(&self) -> Option<f64> {
        match self {
            Nuclide::He3 => Some(116.0),
            Nuclide::Be10 => Some(4.98),
            Nuclide::C14 => Some(17.5),
            Nuclide::Ne21 => Some(19.0),
            Nuclide::Al26 => Some(30.6),
            Nuclide::Cl36 => None,
        }
    }

    /// Percentage of total production contributed by slow muon capture.
    pub fn slow_muon_percent(&self) -> f64 {
        match self {
            Nuclide::He3 => 0.0,
            Nuclide::Be10 => 2.0,
            Nuclide::C14 => 15.0,
            Nuclide::Ne21 => 0.0,
            Nuclide::Al26 => 2.0,
            Nuclide::Cl36 => 0.0,
        }
    }

    /// Percentage of total production contributed by fast muon
    /// interactions.
    pub fn fast_muon_percent(&self) -> f64 {
        match self {
            Nuclide::He3 => 0.0,
            Nuclide::Be10 => 2.0,
            Nuclide::C14 => 2.0,
            Nuclide::Ne21 => 0.0,
            Nuclide::Al26 => 2.0,
            Nuclide::Cl36 => 0.0,
        }
    }
}

impl fmt::Display for Nuclide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

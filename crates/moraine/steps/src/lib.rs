//! Standard processing steps for Moraine
//!
//! This crate holds the concrete science: the steps that turn raw
//! cosmogenic nuclide measurements into exposure ages. Each step is a
//! small, stateless [`moraine_engine::Step`] implementation; the engine
//! owns all iteration state, so the same registered step serves any
//! number of concurrent runs.
//!
//! # Key Concepts
//!
//! - **Environment steps**: Sea level, paleomagnetic intensity, and
//!   atmospheric pressure reconstructed for the sample's current model
//!   age from keyed [`moraine_types::Collection`] tables.
//! - **Production and inventory**: Nuclide production rates scaled for
//!   depth, shielding, and muon contributions, and the timestepped
//!   depletion of the modelled inventory they drive.
//! - **Controllers**: The two bounded loop gates — a tolerance gate that
//!   walks a sample's age toward an independently known age, and a
//!   saturation gate that winds time back until the measured inventory
//!   is fully explained or stops improving.
//!
//! Register everything at once with
//! [`prelude::register_standard_steps`], or pick steps individually.

#![deny(unsafe_code)]

pub mod attrs;
pub mod prelude;

mod basic;
mod controllers;
mod interpolate;
mod nuclide;

pub use basic::*;
pub use controllers::*;
pub use interpolate::*;
pub use nuclide::*;

//! Domain types for Moraine
//!
//! Moraine dates geological samples by driving them through an
//! experiment-parameterized pipeline of numeric steps. This crate holds
//! the data model shared by the resolver, the execution engine, and the
//! concrete steps.
//!
//! # Key Concepts
//!
//! - **Sample**: An attribute bag for one physical specimen, partitioned
//!   into namespaces. The `input` namespace holds the raw measurements
//!   and is never mutated; each experiment run derives its own namespace.
//! - **Collection**: An immutable keyed lookup table (single or composite
//!   key) shared read-only by processing steps.
//! - **Template**: The field-typing and key policy that converts tabular
//!   rows into a [`Collection`].
//! - **Experiment**: A named, immutable set of run parameters — the
//!   convergence timestep, numeric tuning, and one mode choice per
//!   variant slot.
//! - **Factor**: A named variant slot whose modes map to ordered chains
//!   of step names, spliced into a workflow at resolution time.
//! - **WorkflowDefinition**: The directed graph of steps and variant
//!   slots an experiment executes. Cycles are legal and are exactly the
//!   mechanism for iterative convergence.
//!
//! # Design Principles
//!
//! 1. Reads under an experiment namespace fall back to `input`; writes
//!    never touch `input`.
//! 2. Steps locate collections by name, never by direct reference.
//! 3. A workflow is validated before it is resolved, and resolved before
//!    any sample is processed. Partially resolved graphs never execute.

#![deny(unsafe_code)]

mod collection;
mod errors;
mod experiment;
mod factor;
mod sample;
mod template;
mod value;
mod workflow;

pub use collection::*;
pub use errors::*;
pub use experiment::*;
pub use factor::*;
pub use sample::*;
pub use template::*;
pub use value::*;
pub use workflow::*;

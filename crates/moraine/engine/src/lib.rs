//! Execution engine for Moraine
//!
//! The engine takes a validated workflow, an experiment, and a batch of
//! samples, and drives the samples through the graph until every one of
//! them reaches a terminal state. Iteration is not special-cased: a loop
//! edge re-enqueues a batch at an earlier node, and the engine's
//! convergence table bounds how often that can happen.
//!
//! # Key Concepts
//!
//! - **Step**: The unit of computation. A step reads and writes sample
//!   attributes through a [`StepContext`] and routes its batch onward by
//!   edge label.
//! - **StepRegistry**: Name-to-factory table. Workflows reference steps
//!   by name only; the registry supplies fresh instances at resolution
//!   time.
//! - **ResolvedGraph**: A workflow after slot splicing — every variant
//!   slot replaced by the step chain of the experiment's selected mode,
//!   every step instantiated, every loop edge checked against a bounded
//!   controller.
//! - **ConvergenceTable**: Engine-owned iteration state, keyed by
//!   `(sample index, controller node)`. Controllers consult and advance
//!   it; the table clears a sample's entries the moment it leaves a
//!   loop.
//! - **PipelineRunner**: The FIFO work-queue scheduler. One `(node,
//!   batch)` item at a time, until the queue drains or an observer
//!   cancels the run.
//!
//! # Design Principles
//!
//! 1. Resolution failures happen before any sample is touched.
//! 2. Sample-scoped failures retire one sample; the rest of the batch
//!    keeps going. Anything else aborts the run.
//! 3. Every sample that enters a run is accounted for in exactly one
//!    partition of the final report.

#![deny(unsafe_code)]

mod convergence;
mod observer;
mod registry;
mod resolve;
mod runner;
mod step;

pub use convergence::*;
pub use observer::*;
pub use registry::*;
pub use resolve::*;
pub use runner::*;
pub use step::*;

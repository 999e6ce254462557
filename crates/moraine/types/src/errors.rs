//! Error types for pipeline construction and execution

use thiserror::Error;

use crate::sample::SampleId;
use crate::template::FieldType;
use crate::workflow::NodeId;

/// Result alias used throughout the pipeline crates.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while building, resolving, or executing a pipeline.
///
/// Construction and resolution errors are always fatal: a workflow that
/// fails validation never processes a sample. At execution time only the
/// sample-scoped variants (`MissingAttribute`, `ZeroAttribute`) are
/// recoverable — the offending sample moves to the errored partition and
/// the rest of the batch continues. Missing experiment parameters and
/// unknown nuclides are run configuration problems and abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    // ── Workflow construction ──────────────────────────────────────────
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    // Not named `source`: thiserror reserves that field name for error
    // chaining.
    #[error("duplicate edge from {from} with label '{label}'")]
    DuplicateEdge { from: NodeId, label: String },

    #[error("workflow has no entry node (every node has an inbound edge)")]
    NoEntryNode,

    #[error("workflow has multiple entry nodes: {0:?}")]
    MultipleEntryNodes(Vec<NodeId>),

    #[error("node {0} is unreachable from the entry node")]
    UnreachableNode(NodeId),

    #[error("workflow has no nodes")]
    EmptyWorkflow,

    // ── Registry and resolution ────────────────────────────────────────
    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("step already registered: {0}")]
    DuplicateStep(String),

    #[error("unknown variant slot: {0}")]
    UnknownSlot(String),

    #[error("experiment '{experiment}' selects no mode for slot '{slot}'")]
    UnresolvedSlot { slot: String, experiment: String },

    #[error("slot '{slot}' has no mode named '{mode}'")]
    UnknownMode { slot: String, mode: String },

    #[error("duplicate mode '{mode}' in slot '{slot}'")]
    DuplicateMode { slot: String, mode: String },

    #[error("mode '{mode}' of slot '{slot}' expands to an empty step chain")]
    EmptyMode { slot: String, mode: String },

    #[error("duplicate variant slot: {0}")]
    DuplicateFactor(String),

    #[error("loop edge leaves node {0}, which is not a bounded controller")]
    UnboundedLoop(NodeId),

    // ── Samples ────────────────────────────────────────────────────────
    #[error("namespace 'input' is reserved for raw measurements")]
    ReservedNamespace,

    #[error("the input namespace is immutable")]
    InputImmutable,

    #[error("duplicate sample id: {0}")]
    DuplicateSample(SampleId),

    // ── Templates and collections ──────────────────────────────────────
    #[error("template '{0}' declares no key fields")]
    TemplateWithoutKeys(String),

    #[error("template '{0}' needs at least two fields")]
    TemplateTooSmall(String),

    #[error("template '{template}' declares field '{field}' twice")]
    DuplicateField { template: String, field: String },

    #[error("template '{template}', field '{field}': cannot parse '{cell}' as {kind}")]
    CellParse {
        template: String,
        field: String,
        cell: String,
        kind: FieldType,
    },

    #[error("table '{table}': expected {expected} cells per row, got {got}")]
    RowWidth {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("collection '{collection}' has a duplicate key")]
    DuplicateKey { collection: String },

    #[error("collection already registered: {0}")]
    DuplicateCollection(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection '{0}' has no rows")]
    EmptyCollection(String),

    #[error("collection '{collection}' has no entry for key {key}")]
    MissingEntry { collection: String, key: String },

    #[error("collection '{collection}' column '{column}' is not numeric")]
    NonNumericCollection { collection: String, column: String },

    // ── Execution ──────────────────────────────────────────────────────
    #[error("sample {sample}: attribute '{attribute}' missing or non-numeric in step '{step}'")]
    MissingAttribute {
        sample: SampleId,
        attribute: String,
        step: String,
    },

    #[error("sample {sample}: attribute '{attribute}' must be non-zero in step '{step}'")]
    ZeroAttribute {
        sample: SampleId,
        attribute: String,
        step: String,
    },

    #[error("experiment parameter '{parameter}' missing or not of the expected type")]
    MissingParameter { parameter: String },

    #[error("unknown nuclide: {0}")]
    UnknownNuclide(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::NodeId;

    #[test]
    fn test_error_display() {
        let err = PipelineError::UnknownStep("Fuse".to_string());
        assert_eq!(err.to_string(), "unknown step: Fuse");

        let err = PipelineError::UnboundedLoop(NodeId::new("gate"));
        assert!(err.to_string().contains("not a bounded controller"));

        let err = PipelineError::DuplicateEdge {
            from: NodeId::new("gate"),
            label: "loop".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate edge from gate with label 'loop'");
    }

    #[test]
    fn test_errors_are_comparable() {
        let a = PipelineError::CollectionNotFound("sea_level".to_string());
        let b = PipelineError::CollectionNotFound("sea_level".to_string());
        assert_eq!(a, b);
    }
}

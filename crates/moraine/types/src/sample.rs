//! Samples, the sample arena, and batches
//!
//! A [`Sample`] is a namespaced attribute bag for one physical specimen.
//! Raw measurements live in the reserved `input` namespace and never
//! change; every experiment run writes its derived values into its own
//! namespace and reads fall back to `input` for anything the run has not
//! overwritten. The [`SampleArena`] owns every sample for one run and
//! hands out dense indices, so batches and convergence bookkeeping stay
//! cheap copies instead of clones of whole attribute maps.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};
use crate::value::AttributeValue;

/// The reserved namespace holding raw measurements.
pub const INPUT_NAMESPACE: &str = "input";

// ── Sample identity ────────────────────────────────────────────────────

/// Unique identifier for a sample, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleId(pub String);

impl SampleId {
    /// Generate a new random sample id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a sample id from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short prefix for logging.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Sample ─────────────────────────────────────────────────────────────

/// A namespaced attribute bag for one physical specimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    id: SampleId,
    namespaces: HashMap<String, HashMap<String, AttributeValue>>,
}

impl Sample {
    /// Create an empty sample with the given id.
    pub fn new(id: SampleId) -> Self {
        Self {
            id,
            namespaces: HashMap::new(),
        }
    }

    /// Builder: seed one raw measurement into the `input` namespace.
    pub fn with_input(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.namespaces
            .entry(INPUT_NAMESPACE.to_string())
            .or_default()
            .insert(attribute.into(), value.into());
        self
    }

    pub fn id(&self) -> &SampleId {
        &self.id
    }

    /// The raw measurements, empty if none were seeded.
    pub fn input(&self) -> HashMap<String, AttributeValue> {
        self.namespaces
            .get(INPUT_NAMESPACE)
            .cloned()
            .unwrap_or_default()
    }

    /// All attributes written under one namespace.
    pub fn namespace(&self, name: &str) -> Option<&HashMap<String, AttributeValue>> {
        self.namespaces.get(name)
    }

    /// Read an attribute under `namespace`, falling back to the raw
    /// measurement when the run has not overwritten it.
    pub fn read(&self, namespace: &str, attribute: &str) -> Option<&AttributeValue> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.get(attribute))
            .or_else(|| {
                self.namespaces
                    .get(INPUT_NAMESPACE)
                    .and_then(|ns| ns.get(attribute))
            })
    }

    /// Write an attribute under `namespace`.
    ///
    /// The `input` namespace is immutable once a sample is constructed;
    /// writing to it is rejected rather than silently shadowed.
    pub fn write(
        &mut self,
        namespace: &str,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> PipelineResult<()> {
        if namespace == INPUT_NAMESPACE {
            return Err(PipelineError::InputImmutable);
        }
        self.insert(namespace, attribute, value);
        Ok(())
    }

    // Unchecked insert for callers that validated the namespace up front.
    fn insert(
        &mut self,
        namespace: &str,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(attribute.into(), value.into());
    }
}

// ── Sample arena ───────────────────────────────────────────────────────

/// Owns every sample for one run and addresses them by dense index.
///
/// The arena pins the run's working namespace at construction, so writes
/// during execution cannot touch `input` and cannot cross runs.
#[derive(Debug)]
pub struct SampleArena {
    namespace: String,
    samples: Vec<Sample>,
}

impl SampleArena {
    /// Take ownership of `samples` for a run writing under `namespace`.
    ///
    /// Rejects the reserved `input` namespace and duplicate sample ids.
    pub fn new(samples: Vec<Sample>, namespace: impl Into<String>) -> PipelineResult<Self> {
        let namespace = namespace.into();
        if namespace == INPUT_NAMESPACE {
            return Err(PipelineError::ReservedNamespace);
        }
        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample.id().clone()) {
                return Err(PipelineError::DuplicateSample(sample.id().clone()));
            }
        }
        Ok(Self { namespace, samples })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Id of the sample at `index`. Indices come from batches built over
    /// this arena, so out-of-range access is an engine bug and panics.
    pub fn id(&self, index: usize) -> &SampleId {
        self.samples[index].id()
    }

    pub fn get(&self, index: usize) -> &Sample {
        &self.samples[index]
    }

    /// Read an attribute of the sample at `index` under the run
    /// namespace, with the usual fallback to raw measurements.
    pub fn value(&self, index: usize, attribute: &str) -> Option<&AttributeValue> {
        self.samples[index].read(&self.namespace, attribute)
    }

    /// Write an attribute of the sample at `index` under the run
    /// namespace. Infallible: the namespace was validated at build time.
    pub fn set_value(
        &mut self,
        index: usize,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) {
        let Self { namespace, samples } = self;
        samples[index].insert(namespace, attribute, value);
    }

    /// Tear down the arena, yielding the samples in their original order.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

// ── Batches ────────────────────────────────────────────────────────────

/// An ordered set of arena indices travelling an edge together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleBatch {
    members: Vec<usize>,
}

impl SampleBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch covering every sample of an arena of length `len`.
    pub fn full(len: usize) -> Self {
        Self {
            members: (0..len).collect(),
        }
    }

    pub fn from_indices(members: Vec<usize>) -> Self {
        Self { members }
    }

    pub fn push(&mut self, index: usize) {
        self.members.push(index);
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<usize> for SampleBatch {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sample(id: &str) -> Sample {
        Sample::new(SampleId::new(id))
            .with_input("latitude", 43.5)
            .with_input("nuclide", "10Be")
    }

    #[test]
    fn test_read_falls_back_to_input() {
        let mut sample = make_sample("s1");
        assert_eq!(
            sample.read("run-1", "latitude"),
            Some(&AttributeValue::Float(43.5))
        );

        sample.write("run-1", "latitude", 44.0).unwrap();
        assert_eq!(
            sample.read("run-1", "latitude"),
            Some(&AttributeValue::Float(44.0))
        );
        // The raw measurement is untouched.
        assert_eq!(
            sample.input().get("latitude"),
            Some(&AttributeValue::Float(43.5))
        );
    }

    #[test]
    fn test_input_namespace_is_immutable() {
        let mut sample = make_sample("s1");
        let err = sample.write(INPUT_NAMESPACE, "latitude", 0.0).unwrap_err();
        assert_eq!(err, PipelineError::InputImmutable);
    }

    #[test]
    fn test_arena_rejects_reserved_namespace() {
        let err = SampleArena::new(vec![make_sample("s1")], INPUT_NAMESPACE).unwrap_err();
        assert_eq!(err, PipelineError::ReservedNamespace);
    }

    #[test]
    fn test_arena_rejects_duplicate_ids() {
        let err =
            SampleArena::new(vec![make_sample("s1"), make_sample("s1")], "run-1").unwrap_err();
        assert_eq!(err, PipelineError::DuplicateSample(SampleId::new("s1")));
    }

    #[test]
    fn test_arena_reads_and_writes_run_namespace() {
        let mut arena = SampleArena::new(vec![make_sample("s1")], "run-1").unwrap();
        assert_eq!(arena.value(0, "latitude"), Some(&AttributeValue::Float(43.5)));

        arena.set_value(0, "age", 1000.0);
        assert_eq!(arena.value(0, "age"), Some(&AttributeValue::Float(1000.0)));

        let samples = arena.into_samples();
        assert_eq!(
            samples[0].read("run-1", "age"),
            Some(&AttributeValue::Float(1000.0))
        );
        assert!(samples[0].input().get("age").is_none());
    }

    #[test]
    fn test_batch_full_and_collect() {
        let batch = SampleBatch::full(3);
        assert_eq!(batch.iter().collect::<Vec<_>>(), vec![0, 1, 2]);

        let filtered: SampleBatch = batch.iter().filter(|i| i % 2 == 0).collect();
        assert_eq!(filtered, SampleBatch::from_indices(vec![0, 2]));
    }
}

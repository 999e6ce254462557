//! Workflow resolution: slot splicing and loop-boundedness checks
//!
//! Resolution turns a [`WorkflowDefinition`] into a [`ResolvedGraph`]
//! the runner can execute blindly: every variant slot is replaced by the
//! step chain of the mode the experiment selects, every step name is
//! instantiated through the registry, and every loop edge is proven to
//! leave a bounded controller. All of this happens before the first
//! sample is touched, so a misconfigured experiment fails in
//! milliseconds instead of after a half-finished run.

use std::collections::HashMap;
use std::fmt;

use moraine_types::{
    Experiment, FactorSet, NodeId, NodeKind, PipelineError, PipelineResult, WorkflowDefinition,
    LOOP_EDGE, OUTPUT_EDGE,
};
use tracing::{debug, info};

use crate::registry::StepRegistry;
use crate::step::Step;

// Where a node's inbound and outbound edges attach after splicing. For
// plain step nodes both point at the node itself.
struct Splice {
    first: NodeId,
    last: NodeId,
}

/// A workflow after resolution: concrete step instances wired by
/// `(source, label)` routing entries.
pub struct ResolvedGraph {
    name: String,
    entry: NodeId,
    steps: HashMap<NodeId, Box<dyn Step>>,
    edges: HashMap<(NodeId, String), NodeId>,
}

impl ResolvedGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node execution starts at.
    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    pub fn step(&self, id: &NodeId) -> Option<&dyn Step> {
        self.steps.get(id).map(Box::as_ref)
    }

    /// Where the edge leaving `source` under `label` points, if present.
    pub fn target(&self, source: &NodeId, label: &str) -> Option<&NodeId> {
        self.edges.get(&(source.clone(), label.to_string()))
    }

    pub fn node_count(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Debug for ResolvedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&NodeId> = self.steps.keys().collect();
        nodes.sort();
        f.debug_struct("ResolvedGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .finish()
    }
}

/// Resolve a workflow against an experiment's mode selections.
///
/// The loop-boundedness check runs after splicing, so it applies to the
/// step that actually carries each loop edge — for a slot source, the
/// last step of the selected chain.
pub fn resolve(
    workflow: &WorkflowDefinition,
    experiment: &Experiment,
    factors: &FactorSet,
    registry: &StepRegistry,
) -> PipelineResult<ResolvedGraph> {
    workflow.validate()?;

    let mut steps: HashMap<NodeId, Box<dyn Step>> = HashMap::new();
    let mut edges: HashMap<(NodeId, String), NodeId> = HashMap::new();
    let mut splices: HashMap<NodeId, Splice> = HashMap::new();

    for node in &workflow.nodes {
        match &node.kind {
            NodeKind::Step { step } => {
                steps.insert(node.id.clone(), registry.instantiate(step)?);
                splices.insert(
                    node.id.clone(),
                    Splice {
                        first: node.id.clone(),
                        last: node.id.clone(),
                    },
                );
            }
            NodeKind::VariantSlot { slot } => {
                let factor = factors.get(slot)?;
                let mode = experiment
                    .mode_for(slot)
                    .ok_or_else(|| PipelineError::UnresolvedSlot {
                        slot: slot.clone(),
                        experiment: experiment.name().to_string(),
                    })?;
                let chain = factor.chain_for(mode)?;
                // Registration rejects empty chains, but a deserialized
                // factor never went through registration.
                if chain.is_empty() {
                    return Err(PipelineError::EmptyMode {
                        slot: slot.clone(),
                        mode: mode.to_string(),
                    });
                }
                debug!(slot = %slot, mode = %mode, steps = chain.len(), "splicing variant slot");

                let ids: Vec<NodeId> = if chain.len() == 1 {
                    vec![node.id.clone()]
                } else {
                    (0..chain.len())
                        .map(|i| NodeId::new(format!("{}#{}", node.id, i)))
                        .collect()
                };
                for (id, step) in ids.iter().zip(chain) {
                    steps.insert(id.clone(), registry.instantiate(step)?);
                }
                for pair in ids.windows(2) {
                    edges.insert(
                        (pair[0].clone(), OUTPUT_EDGE.to_string()),
                        pair[1].clone(),
                    );
                }
                splices.insert(
                    node.id.clone(),
                    Splice {
                        first: ids[0].clone(),
                        last: ids[ids.len() - 1].clone(),
                    },
                );
            }
        }
    }

    // Workflow edges attach to the spliced ends: inbound edges reach a
    // chain's first step, outbound edges leave its last.
    for edge in &workflow.edges {
        let source = splices[&edge.source].last.clone();
        let target = splices[&edge.target].first.clone();
        edges.insert((source, edge.label.clone()), target);
    }

    for edge in &workflow.edges {
        if edge.label == LOOP_EDGE {
            let carrier = &splices[&edge.source].last;
            let bounded = steps
                .get(carrier)
                .is_some_and(|step| step.is_bounded_controller());
            if !bounded {
                return Err(PipelineError::UnboundedLoop(edge.source.clone()));
            }
        }
    }

    let entry = splices[workflow.entry_node()?].first.clone();
    info!(
        workflow = %workflow.name,
        experiment = %experiment.name(),
        nodes = steps.len(),
        "resolved workflow"
    );

    Ok(ResolvedGraph {
        name: workflow.name.clone(),
        entry,
        steps,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepContext, StepOutput};
    use moraine_types::{Factor, SampleBatch, WorkflowEdge, WorkflowNode};

    struct Tagged(&'static str);

    impl Step for Tagged {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(
            &self,
            _ctx: &mut StepContext<'_>,
            batch: SampleBatch,
        ) -> PipelineResult<StepOutput> {
            Ok(StepOutput::forward(batch))
        }
    }

    struct Gate;

    impl Step for Gate {
        fn name(&self) -> &str {
            "Gate"
        }

        fn apply(
            &self,
            _ctx: &mut StepContext<'_>,
            batch: SampleBatch,
        ) -> PipelineResult<StepOutput> {
            Ok(StepOutput::forward(batch))
        }

        fn is_bounded_controller(&self) -> bool {
            true
        }
    }

    fn make_registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register("A", || Box::new(Tagged("A"))).unwrap();
        registry.register("B", || Box::new(Tagged("B"))).unwrap();
        registry.register("C", || Box::new(Tagged("C"))).unwrap();
        registry.register("Gate", || Box::new(Gate)).unwrap();
        registry
    }

    fn make_factors() -> FactorSet {
        let mut factor = Factor::new("model");
        factor.add_mode("single", vec!["B".to_string()]).unwrap();
        factor
            .add_mode("chained", vec!["B".to_string(), "C".to_string()])
            .unwrap();
        let mut factors = FactorSet::new();
        factors.insert(factor).unwrap();
        factors
    }

    fn make_slotted_workflow() -> WorkflowDefinition {
        let mut workflow = WorkflowDefinition::new("w");
        workflow.add_node(WorkflowNode::step("init", "A")).unwrap();
        workflow.add_node(WorkflowNode::slot("model", "model")).unwrap();
        workflow.add_node(WorkflowNode::step("end", "B")).unwrap();
        workflow.add_edge(WorkflowEdge::forward("init", "model")).unwrap();
        workflow.add_edge(WorkflowEdge::forward("model", "end")).unwrap();
        workflow
    }

    #[test]
    fn test_multi_step_mode_splices_a_chain() {
        let experiment = Experiment::new("e").with_parameter("model", "chained");
        let graph = resolve(
            &make_slotted_workflow(),
            &experiment,
            &make_factors(),
            &make_registry(),
        )
        .unwrap();

        assert_eq!(graph.entry(), &NodeId::new("init"));
        let first = graph.target(&NodeId::new("init"), OUTPUT_EDGE).unwrap();
        assert_eq!(first, &NodeId::new("model#0"));
        assert_eq!(graph.step(first).unwrap().name(), "B");

        let second = graph.target(first, OUTPUT_EDGE).unwrap();
        assert_eq!(second, &NodeId::new("model#1"));
        assert_eq!(graph.step(second).unwrap().name(), "C");

        assert_eq!(
            graph.target(second, OUTPUT_EDGE),
            Some(&NodeId::new("end"))
        );
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn test_single_step_mode_keeps_the_slot_id() {
        let experiment = Experiment::new("e").with_parameter("model", "single");
        let graph = resolve(
            &make_slotted_workflow(),
            &experiment,
            &make_factors(),
            &make_registry(),
        )
        .unwrap();

        let spliced = graph.target(&NodeId::new("init"), OUTPUT_EDGE).unwrap();
        assert_eq!(spliced, &NodeId::new("model"));
        assert_eq!(graph.step(spliced).unwrap().name(), "B");
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_unselected_slot_fails_resolution() {
        let experiment = Experiment::new("bare");
        let err = resolve(
            &make_slotted_workflow(),
            &experiment,
            &make_factors(),
            &make_registry(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnresolvedSlot {
                slot: "model".to_string(),
                experiment: "bare".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_mode_fails_resolution() {
        let experiment = Experiment::new("e").with_parameter("model", "wobble");
        let err = resolve(
            &make_slotted_workflow(),
            &experiment,
            &make_factors(),
            &make_registry(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownMode { .. }));
    }

    #[test]
    fn test_deserialized_empty_mode_chain_fails_resolution() {
        let factor: Factor =
            serde_json::from_str(r#"{"name": "model", "modes": {"hollow": []}}"#).unwrap();
        let mut factors = FactorSet::new();
        factors.insert(factor).unwrap();

        let experiment = Experiment::new("e").with_parameter("model", "hollow");
        let err = resolve(
            &make_slotted_workflow(),
            &experiment,
            &factors,
            &make_registry(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::EmptyMode {
                slot: "model".to_string(),
                mode: "hollow".to_string()
            }
        );
    }

    #[test]
    fn test_ghost_edge_fails_resolution() {
        let mut workflow = WorkflowDefinition::new("w");
        workflow.add_node(WorkflowNode::step("init", "A")).unwrap();
        workflow.edges.push(WorkflowEdge::forward("init", "ghost"));

        let err = resolve(
            &workflow,
            &Experiment::new("e"),
            &FactorSet::new(),
            &make_registry(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::NodeNotFound(NodeId::new("ghost")));
    }

    #[test]
    fn test_unregistered_step_fails_resolution() {
        let mut workflow = WorkflowDefinition::new("w");
        workflow.add_node(WorkflowNode::step("x", "Ghost")).unwrap();
        let err = resolve(
            &workflow,
            &Experiment::new("e"),
            &FactorSet::new(),
            &make_registry(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::UnknownStep("Ghost".to_string()));
    }

    #[test]
    fn test_loop_must_leave_a_bounded_controller() {
        let mut workflow = WorkflowDefinition::new("w");
        workflow.add_node(WorkflowNode::step("init", "A")).unwrap();
        workflow.add_node(WorkflowNode::step("calc", "B")).unwrap();
        workflow.add_edge(WorkflowEdge::forward("init", "calc")).unwrap();
        workflow.add_edge(WorkflowEdge::loop_back("calc", "calc")).unwrap();

        let err = resolve(
            &workflow,
            &Experiment::new("e"),
            &FactorSet::new(),
            &make_registry(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::UnboundedLoop(NodeId::new("calc")));
    }

    #[test]
    fn test_loop_from_controller_is_accepted() {
        let mut workflow = WorkflowDefinition::new("w");
        workflow.add_node(WorkflowNode::step("init", "A")).unwrap();
        workflow.add_node(WorkflowNode::step("gate", "Gate")).unwrap();
        workflow.add_node(WorkflowNode::step("calc", "B")).unwrap();
        workflow.add_edge(WorkflowEdge::forward("init", "gate")).unwrap();
        workflow.add_edge(WorkflowEdge::loop_back("gate", "calc")).unwrap();
        workflow.add_edge(WorkflowEdge::forward("calc", "gate")).unwrap();

        let graph = resolve(
            &workflow,
            &Experiment::new("e"),
            &FactorSet::new(),
            &make_registry(),
        )
        .unwrap();
        assert_eq!(
            graph.target(&NodeId::new("gate"), LOOP_EDGE),
            Some(&NodeId::new("calc"))
        );
    }
}

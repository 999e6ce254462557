//! # Exposure Dating Example
//!
//! This example demonstrates a complete dating run:
//! - Registering the standard step set
//! - Loading reference collections and a variant slot
//! - Building the saturation-gated dating workflow
//! - Running a batch of samples and reading the report
//!
//! Run with: `cargo run --example date_boulders`

use moraine_engine::{PipelineRunner, StepRegistry};
use moraine_steps::attrs;
use moraine_steps::prelude::register_standard_steps;
use moraine_steps::Nuclide;
use moraine_types::{
    AttributeValue, Collection, Experiment, Factor, FieldType, RowKey, Sample, SampleId, Template,
    WorkflowDefinition, WorkflowEdge, WorkflowNode, TIMESTEP_PARAMETER,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for observability
    tracing_subscriber::fmt::init();

    println!("Moraine - Exposure Dating Example\n");

    // Step 1: Register the standard step set
    let mut registry = StepRegistry::new();
    register_standard_steps(&mut registry)?;
    println!("Registered steps: {:?}\n", registry.names());

    // Step 2: Reference collections and the sea-level variant slot
    let mut runner = PipelineRunner::new(registry);
    runner.insert_collection(constants()?)?;
    runner.insert_collection(sea_level()?)?;
    runner.insert_collection(paleomag()?)?;

    let mut factor = Factor::new("sea level model");
    factor.add_mode("eustatic", vec!["SeaLevel".to_string()])?;
    runner.insert_factor(factor)?;

    // Step 3: The dating workflow — a saturation gate winding model time
    // forward through the environment and production steps
    let workflow = dating_workflow()?;

    // Step 4: The experiment freezes every tuning choice for the run,
    // seeded from the nuclide reference table
    let nuclide = Nuclide::He3;
    let reference_rate = nuclide
        .spallation_rate()
        .ok_or("nuclide carries no reference spallation rate")?;
    let experiment = Experiment::new("demo")
        .with_parameter(TIMESTEP_PARAMETER, 10.0)
        .with_parameter(attrs::NUCLIDE_PARAMETER, nuclide.symbol())
        .with_parameter(attrs::SPALLATION_RATE_PARAMETER, reference_rate)
        .with_parameter(attrs::SPALLATION_RATE_UNCERTAINTY_PARAMETER, reference_rate * 0.05)
        .with_parameter(attrs::SLOW_MUON_PARAMETER, nuclide.slow_muon_percent())
        .with_parameter(attrs::FAST_MUON_PARAMETER, nuclide.fast_muon_percent())
        .with_parameter("sea level model", "eustatic");

    // Step 5: Two boulders from the same moraine, one of them producing
    // far too slowly to ever explain its measured inventory
    let samples = vec![
        boulder("boulder-a", 10.0, reference_rate),
        boulder("boulder-b", 0.05, reference_rate),
    ];

    // Step 6: Run and report
    let report = runner.run(&workflow, &experiment, samples)?;
    println!("{}\n", serde_json::to_string_pretty(&report.summary())?);

    for sample in &report.converged {
        let age = sample
            .read("demo", attrs::AGE)
            .and_then(AttributeValue::as_f64)
            .unwrap_or_default();
        let uncertainty = sample
            .read("demo", attrs::AGE_UNCERTAINTY)
            .and_then(AttributeValue::as_f64)
            .unwrap_or_default();
        println!("{}: {age} ± {uncertainty} years", sample.id());
    }
    for (sample, reason) in &report.saturated {
        println!("{}: no age ({reason})", sample.id());
    }

    Ok(())
}

fn constants() -> Result<Collection, Box<dyn std::error::Error>> {
    Ok(Collection::from_rows(
        attrs::CONSTANTS_COLLECTION,
        vec![attrs::CONSTANTS_COLUMN.to_string()],
        vec![
            (RowKey::text(attrs::GRAVITY_ROW), vec![AttributeValue::Float(9.80665)]),
            (RowKey::text(attrs::GAS_CONSTANT_ROW), vec![AttributeValue::Float(287.0)]),
            (
                RowKey::text(attrs::SPALLATION_ATTENUATION_ROW),
                vec![AttributeValue::Float(170.0)],
            ),
            (
                RowKey::text(attrs::MUON_ATTENUATION_ROW),
                vec![AttributeValue::Float(1500.0)],
            ),
        ],
    )?)
}

fn sea_level() -> Result<Collection, Box<dyn std::error::Error>> {
    let template = Template::new(attrs::SEA_LEVEL_COLLECTION)
        .with_key_field("age (kyr)", FieldType::Float)
        .with_value_field(attrs::SEA_LEVEL_COLUMN, FieldType::Float);
    let rows = vec![
        vec!["0".to_string(), "0".to_string()],
        vec!["10".to_string(), "-25".to_string()],
        vec!["20".to_string(), "-80".to_string()],
    ];
    Ok(template.build_collection(&rows)?)
}

fn paleomag() -> Result<Collection, Box<dyn std::error::Error>> {
    Ok(Collection::from_rows(
        attrs::PALEOMAGNETIC_COLLECTION,
        vec![attrs::PALEOMAGNETIC_COLUMN.to_string()],
        vec![
            (RowKey::float(0.0), vec![AttributeValue::Float(1.0)]),
            (RowKey::float(100_000.0), vec![AttributeValue::Float(1.1)]),
        ],
    )?)
}

fn dating_workflow() -> Result<WorkflowDefinition, Box<dyn std::error::Error>> {
    let mut workflow = WorkflowDefinition::new("exposure dating");
    workflow.add_node(WorkflowNode::step("init", "InitDating"))?;
    workflow.add_node(WorkflowNode::step("gate", "InventoryConvergence"))?;
    workflow.add_node(WorkflowNode::slot("sea", "sea level model"))?;
    workflow.add_node(WorkflowNode::step("pressure", "AtmosphericPressure"))?;
    workflow.add_node(WorkflowNode::step("paleomag", "PaleomagneticIntensity"))?;
    workflow.add_node(WorkflowNode::step("production", "ProductionRate"))?;
    workflow.add_node(WorkflowNode::step("inventory", "InventoryChange"))?;
    workflow.add_node(WorkflowNode::step("uncertainty", "AgeUncertainty"))?;

    workflow.add_edge(WorkflowEdge::forward("init", "gate"))?;
    workflow.add_edge(WorkflowEdge::loop_back("gate", "sea"))?;
    workflow.add_edge(WorkflowEdge::forward("sea", "pressure"))?;
    workflow.add_edge(WorkflowEdge::forward("pressure", "paleomag"))?;
    workflow.add_edge(WorkflowEdge::forward("paleomag", "production"))?;
    workflow.add_edge(WorkflowEdge::forward("production", "inventory"))?;
    workflow.add_edge(WorkflowEdge::forward("inventory", "gate"))?;
    workflow.add_edge(WorkflowEdge::forward("gate", "uncertainty"))?;
    Ok(workflow)
}

// The geographic scaling factor is chosen so the boulder produces at
// `production_target` atoms per gram per year under the reference rate.
fn boulder(id: &str, production_target: f64, reference_rate: f64) -> Sample {
    let mass_depth = 5.0 * 2.7;
    let q_s = (170.0 / mass_depth) * (1.0 - (-mass_depth / 170.0f64).exp());
    Sample::new(SampleId::new(id))
        .with_input(attrs::THICKNESS, 5.0)
        .with_input(attrs::DENSITY, 2.7)
        .with_input(attrs::SHIELDING_FACTOR, 1.0)
        .with_input(attrs::SPALLATION_SCALING, production_target / (q_s * reference_rate))
        .with_input(attrs::SEA_LEVEL_PRESSURE, 1013.25)
        .with_input(attrs::SEA_LEVEL_TEMPERATURE, 288.15)
        .with_input(attrs::LAPSE_RATE, 0.0065)
        .with_input(attrs::EFFECTIVE_ELEVATION, 1200.0)
        .with_input(attrs::COSMOGENIC_INVENTORY, 1000.0)
        .with_input(attrs::COSMOGENIC_INVENTORY_UNCERTAINTY, 100.0)
}

//! Environment, production, and inventory steps
//!
//! Every step here is per-sample arithmetic: fatal configuration
//! problems (a missing collection, a missing experiment parameter) are
//! raised before any sample is touched, and everything after that is
//! sample-scoped — one bad sample moves to the errored partition while
//! the rest of the batch continues.

use moraine_engine::{apply_per_sample, Step, StepContext, StepOutput};
use moraine_types::{Collection, PipelineError, PipelineResult, RowKey, SampleBatch};

use crate::attrs;
use crate::interpolate::interpolate_or_mean;
use crate::nuclide::Nuclide;

/// Modelled inventory seeded when a sample arrives without one.
pub const DEFAULT_MODELLED_INVENTORY: f64 = 1_000_000.0;

// Empirical correction carried by the pressure formula.
const PRESSURE_CORRECTION: f64 = 1.019_59;

fn constant(table: &Collection, row: &str) -> PipelineResult<f64> {
    let key = RowKey::text(row);
    table
        .number(&key)
        .ok_or_else(|| PipelineError::MissingEntry {
            collection: table.name().to_string(),
            key: key.to_string(),
        })
}

fn numeric_series(table: &Collection, column: &str) -> PipelineResult<Vec<(f64, f64)>> {
    let entries = table
        .numeric_entries(column)
        .ok_or_else(|| PipelineError::NonNumericCollection {
            collection: table.name().to_string(),
            column: column.to_string(),
        })?;
    if entries.is_empty() {
        return Err(PipelineError::EmptyCollection(table.name().to_string()));
    }
    Ok(entries)
}

// ── Initialisation ─────────────────────────────────────────────────────

/// Resets the model clock and seeds the modelled inventory.
///
/// The age always restarts at zero; the modelled inventory is only
/// defaulted when the sample arrives without one, so calibrated starting
/// inventories pass through untouched.
#[derive(Debug, Default)]
pub struct InitDating;

impl Step for InitDating {
    fn name(&self) -> &str {
        "InitDating"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            ctx.write(index, attrs::AGE, 0.0);
            if ctx.arena.value(index, attrs::MODELLED_INVENTORY).is_none() {
                ctx.write(index, attrs::MODELLED_INVENTORY, DEFAULT_MODELLED_INVENTORY);
            }
            Ok(())
        }))
    }
}

// ── Environment ────────────────────────────────────────────────────────

/// Atmospheric pressure at the sample site from the hypsometric
/// formula:
/// `pressure · (1 − rate·elevation/temperature)^(g_0/(R_d·rate))`,
/// times an empirical correction.
#[derive(Debug, Default)]
pub struct AtmosphericPressure;

impl Step for AtmosphericPressure {
    fn name(&self) -> &str {
        "AtmosphericPressure"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let constants = ctx.collections.get(attrs::CONSTANTS_COLLECTION)?;
        let g_0 = constant(constants, attrs::GRAVITY_ROW)?;
        let r_d = constant(constants, attrs::GAS_CONSTANT_ROW)?;

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let pressure = ctx.read_f64(index, attrs::SEA_LEVEL_PRESSURE, name)?;
            let temperature = ctx.read_f64(index, attrs::SEA_LEVEL_TEMPERATURE, name)?;
            let rate = ctx.read_f64(index, attrs::LAPSE_RATE, name)?;
            let elevation = ctx.read_f64(index, attrs::EFFECTIVE_ELEVATION, name)?;

            let exponent = g_0 / (r_d * rate);
            let base = 1.0 - rate * elevation / temperature;
            ctx.write(
                index,
                attrs::ATMOSPHERIC_PRESSURE,
                pressure * base.powf(exponent) * PRESSURE_CORRECTION,
            );
            Ok(())
        }))
    }
}

/// Eustatic sea-level change at the sample's model age, interpolated
/// from a table keyed in kyr.
#[derive(Debug, Default)]
pub struct SeaLevel;

impl Step for SeaLevel {
    fn name(&self) -> &str {
        "SeaLevel"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let table = ctx.collections.get(attrs::SEA_LEVEL_COLLECTION)?;
        let entries = numeric_series(table, attrs::SEA_LEVEL_COLUMN)?;

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let age = ctx.read_f64(index, attrs::AGE, name)?;
            // The table is keyed in kyr; ages are in years.
            let position = age / 1000.0;
            if let Some(delta) = interpolate_or_mean(&entries, position) {
                ctx.write(index, attrs::EUSTATIC_SEA_LEVEL, delta);
            }
            Ok(())
        }))
    }
}

/// Geomagnetic field intensity at the sample's model age, interpolated
/// from a table keyed in years.
#[derive(Debug, Default)]
pub struct PaleomagneticIntensity;

impl Step for PaleomagneticIntensity {
    fn name(&self) -> &str {
        "PaleomagneticIntensity"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let table = ctx.collections.get(attrs::PALEOMAGNETIC_COLLECTION)?;
        let entries = numeric_series(table, attrs::PALEOMAGNETIC_COLUMN)?;

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let age = ctx.read_f64(index, attrs::AGE, name)?;
            if let Some(intensity) = interpolate_or_mean(&entries, age) {
                ctx.write(index, attrs::PALEOMAGNETIC_INTENSITY, intensity);
            }
            Ok(())
        }))
    }
}

// ── Production ─────────────────────────────────────────────────────────

/// Total nuclide production rate from spallation and muons.
///
/// Mass depth attenuates both pathways:
/// `Q_s = (Λ_f/Z)·(1 − e^{−Z/Λ_f})` and
/// `Q_μ = Λ_μ·(1 − e^{−Z/Λ_μ})/Z` with `Z = thickness · density`.
/// Spallation is `S_sp · shielding · Q_s · ψ`; the muogenic share is
/// derived from the calibrated percentage contributions, scaled by the
/// slow and fast muon factors, and zero when both percentages are zero.
/// The production uncertainty scales the spallation term by the relative
/// uncertainty of ψ.
#[derive(Debug, Default)]
pub struct ProductionRate;

impl Step for ProductionRate {
    fn name(&self) -> &str {
        "ProductionRate"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let constants = ctx.collections.get(attrs::CONSTANTS_COLLECTION)?;
        let lambda_f = constant(constants, attrs::SPALLATION_ATTENUATION_ROW)?;
        let lambda_mu = constant(constants, attrs::MUON_ATTENUATION_ROW)?;

        let psi = ctx
            .experiment
            .require_f64(attrs::SPALLATION_RATE_PARAMETER)?;
        let psi_uncertainty = ctx
            .experiment
            .require_f64(attrs::SPALLATION_RATE_UNCERTAINTY_PARAMETER)?;
        let slow = ctx.experiment.require_f64(attrs::SLOW_MUON_PARAMETER)?;
        let fast = ctx.experiment.require_f64(attrs::FAST_MUON_PARAMETER)?;
        let muon_fraction = (slow + fast) / 100.0;

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let thickness = ctx.read_f64(index, attrs::THICKNESS, name)?;
            let density = ctx.read_f64(index, attrs::DENSITY, name)?;
            let shielding = ctx.read_f64(index, attrs::SHIELDING_FACTOR, name)?;
            let spallation_scaling = ctx.read_f64(index, attrs::SPALLATION_SCALING, name)?;

            let mass_depth = thickness * density;
            // Both self-shielding ratios divide by mass depth.
            if mass_depth == 0.0 {
                let attribute = if thickness == 0.0 { attrs::THICKNESS } else { attrs::DENSITY };
                return Err(PipelineError::ZeroAttribute {
                    sample: ctx.arena.id(index).clone(),
                    attribute: attribute.to_string(),
                    step: name.to_string(),
                });
            }
            let q_spallation = (lambda_f / mass_depth) * (1.0 - (-mass_depth / lambda_f).exp());
            let q_muon = lambda_mu * (1.0 - (-mass_depth / lambda_mu).exp()) / mass_depth;

            let p_spallation = spallation_scaling * shielding * q_spallation * psi;
            let p_muon = if muon_fraction > 0.0 {
                let slow_scaling = ctx.read_f64(index, attrs::SLOW_MUON_SCALING, name)?;
                let fast_scaling = ctx.read_f64(index, attrs::FAST_MUON_SCALING, name)?;
                let p_muon_total = psi / (1.0 - muon_fraction) - psi;
                let p_slow = slow / (100.0 * muon_fraction) * p_muon_total;
                let p_fast = fast / (100.0 * muon_fraction) * p_muon_total;
                (slow_scaling * p_slow + fast_scaling * p_fast) * shielding * q_muon
            } else {
                0.0
            };

            ctx.write(index, attrs::MASS_DEPTH, mass_depth);
            ctx.write(index, attrs::SPALLATION_SELF_SHIELDING, q_spallation);
            ctx.write(index, attrs::MUON_SELF_SHIELDING, q_muon);
            ctx.write(index, attrs::SPALLATION_PRODUCTION, p_spallation);
            ctx.write(index, attrs::MUON_PRODUCTION, p_muon);
            ctx.write(index, attrs::TOTAL_PRODUCTION, p_spallation + p_muon);
            ctx.write(
                index,
                attrs::TOTAL_PRODUCTION_UNCERTAINTY,
                p_spallation * psi_uncertainty / psi,
            );
            Ok(())
        }))
    }
}

// ── Inventory evolution ────────────────────────────────────────────────

/// One timestep of inventory depletion.
///
/// The first pass (model age equals one timestep) primes the modelled
/// inventory from the measurement. Every later pass subtracts the
/// production accumulated over the timestep, decay-corrected back to the
/// sample's current model age; stable nuclides skip both exponentials.
#[derive(Debug, Default)]
pub struct InventoryChange;

impl Step for InventoryChange {
    fn name(&self) -> &str {
        "InventoryChange"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let timestep = ctx.experiment.timestep()?;
        let symbol = ctx
            .experiment
            .get_str(attrs::NUCLIDE_PARAMETER)
            .ok_or_else(|| PipelineError::MissingParameter {
                parameter: attrs::NUCLIDE_PARAMETER.to_string(),
            })?;
        let nuclide = Nuclide::from_symbol(symbol)?;
        let decay = nuclide.decay_constant();

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let age = ctx.read_f64(index, attrs::AGE, name)?;
            if age == timestep {
                let inventory = ctx.read_f64(index, attrs::COSMOGENIC_INVENTORY, name)?;
                ctx.write(index, attrs::MODELLED_INVENTORY, inventory);
                ctx.write(index, attrs::MODELLED_INVENTORY_UNCERTAINTY, 0.0);
                return Ok(());
            }

            let production = ctx.read_f64(index, attrs::TOTAL_PRODUCTION, name)?;
            let production_uncertainty =
                ctx.read_f64(index, attrs::TOTAL_PRODUCTION_UNCERTAINTY, name)?;
            let modelled = ctx.read_f64(index, attrs::MODELLED_INVENTORY, name)?;
            let modelled_uncertainty =
                ctx.read_f64(index, attrs::MODELLED_INVENTORY_UNCERTAINTY, name)?;

            let (window, decay_to_age) = if nuclide.is_stable() {
                (timestep, 1.0)
            } else {
                ((1.0 - (-decay * timestep).exp()) / decay, (-decay * age).exp())
            };
            ctx.write(
                index,
                attrs::MODELLED_INVENTORY,
                modelled - decay_to_age * production * window,
            );
            ctx.write(
                index,
                attrs::MODELLED_INVENTORY_UNCERTAINTY,
                modelled_uncertainty + decay_to_age * production_uncertainty * timestep,
            );
            Ok(())
        }))
    }
}

// ── Output ─────────────────────────────────────────────────────────────

/// Publishes the measured inventory and derives the age uncertainty,
/// rounded to the nearest timestep. A zero inventory fails the sample,
/// since the uncertainty divides by it.
#[derive(Debug, Default)]
pub struct AgeUncertainty;

impl Step for AgeUncertainty {
    fn name(&self) -> &str {
        "AgeUncertainty"
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let timestep = ctx.experiment.timestep()?;

        let name = self.name();
        Ok(apply_per_sample(ctx, &batch, |ctx, index| {
            let age = ctx.read_f64(index, attrs::AGE, name)?;
            let inventory = ctx.read_f64(index, attrs::COSMOGENIC_INVENTORY, name)?;
            let uncertainty =
                ctx.read_f64(index, attrs::COSMOGENIC_INVENTORY_UNCERTAINTY, name)?;
            if inventory == 0.0 {
                return Err(PipelineError::ZeroAttribute {
                    sample: ctx.arena.id(index).clone(),
                    attribute: attrs::COSMOGENIC_INVENTORY.to_string(),
                    step: name.to_string(),
                });
            }

            ctx.write(index, attrs::MEASURED_INVENTORY, inventory);
            ctx.write(index, attrs::MEASURED_INVENTORY_UNCERTAINTY, uncertainty);

            let raw = age * uncertainty / inventory;
            ctx.write(index, attrs::AGE_UNCERTAINTY, (raw / timestep).round() * timestep);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moraine_engine::ConvergenceTable;
    use moraine_types::{
        AttributeValue, CollectionSet, Experiment, NodeId, Sample, SampleArena, SampleId,
        TIMESTEP_PARAMETER,
    };

    fn make_constants() -> Collection {
        Collection::from_rows(
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
        )
        .unwrap()
    }

    fn make_sea_level() -> Collection {
        Collection::from_rows(
            attrs::SEA_LEVEL_COLLECTION,
            vec![attrs::SEA_LEVEL_COLUMN.to_string()],
            vec![
                (RowKey::float(0.0), vec![AttributeValue::Float(0.0)]),
                (RowKey::float(1.0), vec![AttributeValue::Float(-10.0)]),
                (RowKey::float(2.0), vec![AttributeValue::Float(-30.0)]),
            ],
        )
        .unwrap()
    }

    fn make_paleomag() -> Collection {
        Collection::from_rows(
            attrs::PALEOMAGNETIC_COLLECTION,
            vec![attrs::PALEOMAGNETIC_COLUMN.to_string()],
            vec![
                (RowKey::float(0.0), vec![AttributeValue::Float(1.0)]),
                (RowKey::float(1000.0), vec![AttributeValue::Float(1.2)]),
                (RowKey::float(2000.0), vec![AttributeValue::Float(0.8)]),
            ],
        )
        .unwrap()
    }

    fn make_collections() -> CollectionSet {
        let mut set = CollectionSet::new();
        set.insert(make_constants()).unwrap();
        set.insert(make_sea_level()).unwrap();
        set.insert(make_paleomag()).unwrap();
        set
    }

    fn make_experiment() -> Experiment {
        Experiment::new("test")
            .with_parameter(TIMESTEP_PARAMETER, 10.0)
            .with_parameter(attrs::NUCLIDE_PARAMETER, "10Be")
            .with_parameter(attrs::SPALLATION_RATE_PARAMETER, 5.0)
            .with_parameter(attrs::SPALLATION_RATE_UNCERTAINTY_PARAMETER, 0.5)
            .with_parameter(attrs::SLOW_MUON_PARAMETER, 2.0)
            .with_parameter(attrs::FAST_MUON_PARAMETER, 2.0)
    }

    fn make_sample() -> Sample {
        Sample::new(SampleId::new("boulder-1"))
            .with_input(attrs::THICKNESS, 5.0)
            .with_input(attrs::DENSITY, 2.7)
            .with_input(attrs::SHIELDING_FACTOR, 0.95)
            .with_input(attrs::SPALLATION_SCALING, 4.0)
            .with_input(attrs::SLOW_MUON_SCALING, 1.5)
            .with_input(attrs::FAST_MUON_SCALING, 1.1)
            .with_input(attrs::SEA_LEVEL_PRESSURE, 1013.25)
            .with_input(attrs::SEA_LEVEL_TEMPERATURE, 288.15)
            .with_input(attrs::LAPSE_RATE, 0.0065)
            .with_input(attrs::EFFECTIVE_ELEVATION, 2000.0)
            .with_input(attrs::COSMOGENIC_INVENTORY, 120_000.0)
            .with_input(attrs::COSMOGENIC_INVENTORY_UNCERTAINTY, 6_000.0)
    }

    struct Fixture {
        arena: SampleArena,
        experiment: Experiment,
        collections: CollectionSet,
        convergence: ConvergenceTable,
        node: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_samples(vec![make_sample()])
        }

        fn with_samples(samples: Vec<Sample>) -> Self {
            Self {
                arena: SampleArena::new(samples, "test").unwrap(),
                experiment: make_experiment(),
                collections: make_collections(),
                convergence: ConvergenceTable::new(),
                node: NodeId::new("node"),
            }
        }

        fn apply(&mut self, step: &dyn Step) -> StepOutput {
            let batch = SampleBatch::full(self.arena.len());
            let mut ctx = StepContext {
                arena: &mut self.arena,
                experiment: &self.experiment,
                collections: &self.collections,
                convergence: &mut self.convergence,
                node: &self.node,
            };
            step.apply(&mut ctx, batch).unwrap()
        }

        fn value(&self, attribute: &str) -> f64 {
            self.arena
                .value(0, attribute)
                .and_then(AttributeValue::as_f64)
                .unwrap()
        }

        fn set(&mut self, attribute: &str, value: f64) {
            self.arena.set_value(0, attribute, value);
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9 * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_init_resets_age_and_defaults_inventory() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 5000.0);
        fixture.apply(&InitDating);

        assert_eq!(fixture.value(attrs::AGE), 0.0);
        assert_eq!(fixture.value(attrs::MODELLED_INVENTORY), DEFAULT_MODELLED_INVENTORY);
    }

    #[test]
    fn test_init_keeps_existing_inventory() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::MODELLED_INVENTORY, 42.0);
        fixture.apply(&InitDating);
        assert_eq!(fixture.value(attrs::MODELLED_INVENTORY), 42.0);
    }

    #[test]
    fn test_atmospheric_pressure_formula() {
        let mut fixture = Fixture::new();
        fixture.apply(&AtmosphericPressure);

        let exponent = 9.80665 / (287.0 * 0.0065);
        let base: f64 = 1.0 - 0.0065 * 2000.0 / 288.15;
        let expected = 1013.25 * base.powf(exponent) * 1.01959;
        assert_close(fixture.value(attrs::ATMOSPHERIC_PRESSURE), expected);
    }

    #[test]
    fn test_sea_level_interpolates_in_kyr() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 1500.0);
        fixture.apply(&SeaLevel);
        // 1.5 kyr sits halfway between -10 and -30.
        assert_close(fixture.value(attrs::EUSTATIC_SEA_LEVEL), -20.0);
    }

    #[test]
    fn test_sea_level_past_record_uses_mean() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 50_000.0);
        fixture.apply(&SeaLevel);
        assert_close(fixture.value(attrs::EUSTATIC_SEA_LEVEL), (0.0 - 10.0 - 30.0) / 3.0);
    }

    #[test]
    fn test_paleomagnetic_intensity_keys_in_years() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 500.0);
        fixture.apply(&PaleomagneticIntensity);
        assert_close(fixture.value(attrs::PALEOMAGNETIC_INTENSITY), 1.1);
    }

    #[test]
    fn test_production_rate_with_muon_contribution() {
        let mut fixture = Fixture::new();
        fixture.apply(&ProductionRate);

        let mass_depth = 5.0 * 2.7;
        let q_s = (170.0 / mass_depth) * (1.0 - (-mass_depth / 170.0f64).exp());
        let q_mu = 1500.0 * (1.0 - (-mass_depth / 1500.0f64).exp()) / mass_depth;
        assert_close(fixture.value(attrs::MASS_DEPTH), mass_depth);
        assert_close(fixture.value(attrs::SPALLATION_SELF_SHIELDING), q_s);
        assert_close(fixture.value(attrs::MUON_SELF_SHIELDING), q_mu);

        let p_sp = 4.0 * 0.95 * q_s * 5.0;
        assert_close(fixture.value(attrs::SPALLATION_PRODUCTION), p_sp);

        // 4% muogenic: the spallation rate implies the muon share.
        let muon_fraction: f64 = 0.04;
        let p_mu_total = 5.0 / (1.0 - muon_fraction) - 5.0;
        let p_slow = 2.0 / (100.0 * muon_fraction) * p_mu_total;
        let p_fast = 2.0 / (100.0 * muon_fraction) * p_mu_total;
        let p_mu = (1.5 * p_slow + 1.1 * p_fast) * 0.95 * q_mu;
        assert_close(fixture.value(attrs::MUON_PRODUCTION), p_mu);
        assert_close(fixture.value(attrs::TOTAL_PRODUCTION), p_sp + p_mu);
        assert_close(fixture.value(attrs::TOTAL_PRODUCTION_UNCERTAINTY), p_sp * 0.5 / 5.0);
    }

    #[test]
    fn test_production_without_muons_skips_their_scalings() {
        // No muon scaling attributes on the sample at all.
        let sample = Sample::new(SampleId::new("helium"))
            .with_input(attrs::THICKNESS, 5.0)
            .with_input(attrs::DENSITY, 2.7)
            .with_input(attrs::SHIELDING_FACTOR, 1.0)
            .with_input(attrs::SPALLATION_SCALING, 1.0);
        let mut fixture = Fixture::with_samples(vec![sample]);
        fixture.experiment = make_experiment()
            .with_parameter(attrs::SLOW_MUON_PARAMETER, 0.0)
            .with_parameter(attrs::FAST_MUON_PARAMETER, 0.0);

        let output = fixture.apply(&ProductionRate);
        assert!(output.failures.is_empty());
        assert_eq!(fixture.value(attrs::MUON_PRODUCTION), 0.0);
        assert!(fixture.value(attrs::TOTAL_PRODUCTION) > 0.0);
    }

    #[test]
    fn test_production_rate_zero_thickness_fails_the_sample() {
        let sample = make_sample().with_input(attrs::THICKNESS, 0.0);
        let mut fixture = Fixture::with_samples(vec![sample]);

        let output = fixture.apply(&ProductionRate);
        assert_eq!(output.failures.len(), 1);
        assert!(matches!(
            &output.failures[0].1,
            PipelineError::ZeroAttribute { attribute, .. } if attribute == attrs::THICKNESS
        ));
        assert!(fixture.arena.value(0, attrs::TOTAL_PRODUCTION).is_none());
    }

    #[test]
    fn test_inventory_change_first_pass_primes() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 10.0);
        fixture.apply(&InventoryChange);

        assert_eq!(fixture.value(attrs::MODELLED_INVENTORY), 120_000.0);
        assert_eq!(fixture.value(attrs::MODELLED_INVENTORY_UNCERTAINTY), 0.0);
    }

    #[test]
    fn test_inventory_change_radioactive_depletion() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 20.0);
        fixture.set(attrs::MODELLED_INVENTORY, 120_000.0);
        fixture.set(attrs::MODELLED_INVENTORY_UNCERTAINTY, 1.0);
        fixture.set(attrs::TOTAL_PRODUCTION, 8.0);
        fixture.set(attrs::TOTAL_PRODUCTION_UNCERTAINTY, 0.8);
        fixture.apply(&InventoryChange);

        let decay = Nuclide::Be10.decay_constant();
        let window = (1.0 - (-decay * 10.0f64).exp()) / decay;
        let to_age = (-decay * 20.0f64).exp();
        assert_close(
            fixture.value(attrs::MODELLED_INVENTORY),
            120_000.0 - to_age * 8.0 * window,
        );
        assert_close(
            fixture.value(attrs::MODELLED_INVENTORY_UNCERTAINTY),
            1.0 + to_age * 0.8 * 10.0,
        );
    }

    #[test]
    fn test_inventory_change_stable_nuclide_skips_decay() {
        let mut fixture = Fixture::new();
        fixture.experiment = make_experiment().with_parameter(attrs::NUCLIDE_PARAMETER, "3He");
        fixture.set(attrs::AGE, 20.0);
        fixture.set(attrs::MODELLED_INVENTORY, 1000.0);
        fixture.set(attrs::MODELLED_INVENTORY_UNCERTAINTY, 0.0);
        fixture.set(attrs::TOTAL_PRODUCTION, 8.0);
        fixture.set(attrs::TOTAL_PRODUCTION_UNCERTAINTY, 0.8);
        fixture.apply(&InventoryChange);

        assert_close(fixture.value(attrs::MODELLED_INVENTORY), 1000.0 - 8.0 * 10.0);
        assert_close(fixture.value(attrs::MODELLED_INVENTORY_UNCERTAINTY), 0.8 * 10.0);
    }

    #[test]
    fn test_unknown_nuclide_is_fatal() {
        let mut fixture = Fixture::new();
        fixture.experiment = make_experiment().with_parameter(attrs::NUCLIDE_PARAMETER, "12C");
        fixture.set(attrs::AGE, 10.0);

        let batch = SampleBatch::full(1);
        let mut ctx = StepContext {
            arena: &mut fixture.arena,
            experiment: &fixture.experiment,
            collections: &fixture.collections,
            convergence: &mut fixture.convergence,
            node: &fixture.node,
        };
        let err = InventoryChange.apply(&mut ctx, batch).unwrap_err();
        assert_eq!(err, PipelineError::UnknownNuclide("12C".to_string()));
    }

    #[test]
    fn test_age_uncertainty_rounds_to_timestep() {
        let mut fixture = Fixture::new();
        fixture.set(attrs::AGE, 1234.0);
        fixture.apply(&AgeUncertainty);

        assert_eq!(fixture.value(attrs::MEASURED_INVENTORY), 120_000.0);
        assert_eq!(fixture.value(attrs::MEASURED_INVENTORY_UNCERTAINTY), 6_000.0);
        // 1234 * 6000 / 120000 = 61.7, rounded to the nearest 10.
        assert_eq!(fixture.value(attrs::AGE_UNCERTAINTY), 60.0);
    }

    #[test]
    fn test_age_uncertainty_zero_inventory_fails_the_sample() {
        let sample = make_sample().with_input(attrs::COSMOGENIC_INVENTORY, 0.0);
        let mut fixture = Fixture::with_samples(vec![sample]);
        fixture.set(attrs::AGE, 1234.0);

        let output = fixture.apply(&AgeUncertainty);
        assert_eq!(output.failures.len(), 1);
        assert!(matches!(
            &output.failures[0].1,
            PipelineError::ZeroAttribute { attribute, .. }
                if attribute == attrs::COSMOGENIC_INVENTORY
        ));
        assert!(output.routes.is_empty());
        // Nothing half-written: the sample failed before the first write.
        assert!(fixture.arena.value(0, attrs::MEASURED_INVENTORY).is_none());
        assert!(fixture.arena.value(0, attrs::AGE_UNCERTAINTY).is_none());
    }

    #[test]
    fn test_missing_attribute_fails_only_that_sample() {
        let complete = make_sample();
        let incomplete = Sample::new(SampleId::new("bare"));
        let mut fixture = Fixture::with_samples(vec![complete, incomplete]);
        fixture.arena.set_value(0, attrs::AGE, 0.0);
        fixture.arena.set_value(1, attrs::AGE, 0.0);

        let output = fixture.apply(&AtmosphericPressure);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].0, 1);
        assert_eq!(output.routes.len(), 1);
        assert_eq!(output.routes[0].1, SampleBatch::from_indices(vec![0]));
    }

    #[test]
    fn test_missing_collection_is_fatal() {
        let mut fixture = Fixture::new();
        fixture.collections = CollectionSet::new();

        let batch = SampleBatch::full(1);
        let mut ctx = StepContext {
            arena: &mut fixture.arena,
            experiment: &fixture.experiment,
            collections: &fixture.collections,
            convergence: &mut fixture.convergence,
            node: &fixture.node,
        };
        let err = SeaLevel.apply(&mut ctx, batch).unwrap_err();
        assert_eq!(
            err,
            PipelineError::CollectionNotFound(attrs::SEA_LEVEL_COLLECTION.to_string())
        );
    }
}

//! Standard step set registration

use moraine_engine::StepRegistry;
use moraine_types::PipelineResult;

use crate::attrs;
use crate::basic::{
    AgeUncertainty, AtmosphericPressure, InitDating, InventoryChange, PaleomagneticIntensity,
    ProductionRate, SeaLevel,
};
use crate::controllers::{ConvergenceTarget, SaturationController, ToleranceController};

/// Register every step this crate ships under its canonical name.
///
/// Workflows reference these names; `InventoryConvergence` gates the
/// dating loop and `CalibrationConvergence` gates the calibration loop.
pub fn register_standard_steps(registry: &mut StepRegistry) -> PipelineResult<()> {
    registry.register("InitDating", || Box::new(InitDating))?;
    registry.register("AtmosphericPressure", || Box::new(AtmosphericPressure))?;
    registry.register("SeaLevel", || Box::new(SeaLevel))?;
    registry.register("PaleomagneticIntensity", || Box::new(PaleomagneticIntensity))?;
    registry.register("ProductionRate", || Box::new(ProductionRate))?;
    registry.register("InventoryChange", || Box::new(InventoryChange))?;
    registry.register("AgeUncertainty", || Box::new(AgeUncertainty))?;
    registry.register("InventoryConvergence", || {
        Box::new(SaturationController::new(
            "InventoryConvergence",
            attrs::MODELLED_INVENTORY,
            attrs::AGE,
        ))
    })?;
    registry.register("CalibrationConvergence", || {
        Box::new(ToleranceController::new(
            "CalibrationConvergence",
            attrs::AGE,
            ConvergenceTarget::Attribute(attrs::INDEPENDENT_AGE.to_string()),
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_steps_register_cleanly() {
        let mut registry = StepRegistry::new();
        register_standard_steps(&mut registry).unwrap();

        assert_eq!(registry.len(), 9);
        assert!(registry.contains("InventoryChange"));
        assert!(registry
            .instantiate("InventoryConvergence")
            .unwrap()
            .is_bounded_controller());
        assert!(registry
            .instantiate("CalibrationConvergence")
            .unwrap()
            .is_bounded_controller());
        assert!(!registry.instantiate("SeaLevel").unwrap().is_bounded_controller());
    }

    #[test]
    fn test_registration_is_not_idempotent() {
        let mut registry = StepRegistry::new();
        register_standard_steps(&mut registry).unwrap();
        assert!(register_standard_steps(&mut registry).is_err());
    }
}

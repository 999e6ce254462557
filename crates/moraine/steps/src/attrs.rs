//! Shared attribute, parameter, and collection names
//!
//! Steps communicate through sample attributes, so the names are the
//! contract. Raw measurements (the `input` namespace) and derived values
//! share this vocabulary; experiment parameters and collection names are
//! listed here too so workflows, fixtures, and tests stay in agreement.

// ── Sample attributes ──────────────────────────────────────────────────

/// Model age of the sample, in years.
pub const AGE: &str = "age";
/// Age uncertainty, rounded to the experiment timestep.
pub const AGE_UNCERTAINTY: &str = "age uncertainty";
/// Independently known age used by calibration loops.
pub const INDEPENDENT_AGE: &str = "independent age";

/// Measured cosmogenic inventory, atoms per gram.
pub const COSMOGENIC_INVENTORY: &str = "cosmogenic inventory";
pub const COSMOGENIC_INVENTORY_UNCERTAINTY: &str = "cosmogenic inventory uncertainty";
/// Output copy of the measured inventory.
pub const MEASURED_INVENTORY: &str = "measured inventory";
pub const MEASURED_INVENTORY_UNCERTAINTY: &str = "measured inventory uncertainty";
/// The part of the measured inventory the model has not yet explained.
pub const MODELLED_INVENTORY: &str = "modelled inventory";
pub const MODELLED_INVENTORY_UNCERTAINTY: &str = "modelled inventory uncertainty";

/// Total nuclide production rate, atoms per gram per year.
pub const TOTAL_PRODUCTION: &str = "total production rate";
pub const TOTAL_PRODUCTION_UNCERTAINTY: &str = "total production rate uncertainty";
pub const SPALLATION_PRODUCTION: &str = "spallation production rate";
pub const MUON_PRODUCTION: &str = "muon production rate";

/// Eustatic sea-level change at the sample's model age, in metres.
pub const EUSTATIC_SEA_LEVEL: &str = "eustatic sea-level change";
/// Geomagnetic field intensity at the sample's model age.
pub const PALEOMAGNETIC_INTENSITY: &str = "paleomagnetic intensity";
/// Atmospheric pressure at the sample site, in hPa.
pub const ATMOSPHERIC_PRESSURE: &str = "atmospheric pressure";
pub const SEA_LEVEL_PRESSURE: &str = "sea level pressure";
pub const SEA_LEVEL_TEMPERATURE: &str = "sea level temperature";
pub const LAPSE_RATE: &str = "lapse rate";
pub const EFFECTIVE_ELEVATION: &str = "effective elevation";

/// Sample thickness, in centimetres.
pub const THICKNESS: &str = "thickness";
/// Rock density, in grams per cubic centimetre.
pub const DENSITY: &str = "density";
/// Topographic and geometric shielding factor, 0 to 1.
pub const SHIELDING_FACTOR: &str = "shielding factor";
/// Mass depth (thickness times density), grams per square centimetre.
pub const MASS_DEPTH: &str = "mass depth";
/// Depth-integrated self-shielding for spallation.
pub const SPALLATION_SELF_SHIELDING: &str = "spallation self-shielding";
/// Depth-integrated self-shielding for muons.
pub const MUON_SELF_SHIELDING: &str = "muon self-shielding";

/// Geographic scaling factor for spallation.
pub const SPALLATION_SCALING: &str = "spallation scaling";
/// Geographic scaling factor for slow muons.
pub const SLOW_MUON_SCALING: &str = "slow muon scaling";
/// Geographic scaling factor for fast muons.
pub const FAST_MUON_SCALING: &str = "fast muon scaling";

// ── Experiment parameters ──────────────────────────────────────────────

/// Symbol of the nuclide being modelled, e.g. `10Be`.
pub const NUCLIDE_PARAMETER: &str = "nuclide";
/// Calibrated sea-level spallation production rate.
pub const SPALLATION_RATE_PARAMETER: &str = "spallation production rate";
pub const SPALLATION_RATE_UNCERTAINTY_PARAMETER: &str = "spallation production rate uncertainty";
/// Percentage of production from slow muon capture.
pub const SLOW_MUON_PARAMETER: &str = "slow muon contribution";
/// Percentage of production from fast muon interactions.
pub const FAST_MUON_PARAMETER: &str = "fast muon contribution";
/// Optional override for the saturation settle tolerance.
pub const SATURATION_TOLERANCE_PARAMETER: &str = "saturation tolerance";

// ── Collections ────────────────────────────────────────────────────────

/// Physical constants, keyed by name with a single `value` column.
pub const CONSTANTS_COLLECTION: &str = "constants";
/// Eustatic sea-level change by age in kyr.
pub const SEA_LEVEL_COLLECTION: &str = "sea level";
/// Geomagnetic field intensity by age in years.
pub const PALEOMAGNETIC_COLLECTION: &str = "paleomagnetic";

pub const CONSTANTS_COLUMN: &str = "value";
pub const SEA_LEVEL_COLUMN: &str = "sea-level change";
pub const PALEOMAGNETIC_COLUMN: &str = "intensity";

// Row keys into the constants collection.
pub const GRAVITY_ROW: &str = "g_0";
pub const GAS_CONSTANT_ROW: &str = "R_d";
pub const SPALLATION_ATTENUATION_ROW: &str = "spallation attenuation length";
pub const MUON_ATTENUATION_ROW: &str = "muon attenuation length";

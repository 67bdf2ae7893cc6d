//! The orientation-keyed intermediate representation produced by domain
//! merge, closer to how a human describes a building from drawings than
//! the flat `BuildingSpec` used for verification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallKey {
    North,
    East,
    South,
    West,
}

impl WallKey {
    pub const ALL: [WallKey; 4] = [WallKey::North, WallKey::East, WallKey::South, WallKey::West];

    /// Fixed key → wall-name map from §4.7.
    pub fn wall_name(self) -> &'static str {
        match self {
            WallKey::North => "N Wall",
            WallKey::East => "E Wall",
            WallKey::South => "S Wall",
            WallKey::West => "W Wall",
        }
    }

    /// Default azimuth per key, used only when the wall carries none
    /// explicitly. This is the CBECC "east = front" convention, not a
    /// geographic one.
    pub fn default_azimuth(self) -> f64 {
        match self {
            WallKey::North => 0.0,
            WallKey::East => 90.0,
            WallKey::South => 180.0,
            WallKey::West => 270.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub identity: Option<String>,
    pub location: Option<String>,
    pub climate_zone: Option<String>,
    pub fuel_type: Option<String>,
    pub house_type: Option<String>,
    pub stories: Option<u32>,
    pub bedrooms: Option<u32>,
    /// Front-orientation bearing resolved by C5, threaded into this record
    /// by the orchestrator (§4.8 step 3/4).
    pub orientation: Option<f64>,
    pub conditioned_floor_area: Option<f64>,
    pub envelope_area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenestrationEntry {
    pub name: String,
    pub area: f64,
    #[serde(default = "one")]
    pub multiplier: f64,
    pub u_factor: Option<f64>,
    pub shgc: Option<f64>,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueDoorEntry {
    pub name: String,
    pub area: f64,
    pub u_factor: Option<f64>,
}

/// One cardinal wall, carrying its own fenestration and opaque doors.
/// Fenestration is nested within its parent wall; there is no separate
/// top-level window list at this stage (that only appears in
/// `BuildingSpec`, after the transform).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeoffWall {
    pub gross_area: Option<f64>,
    pub azimuth: Option<f64>,
    pub construction: Option<String>,
    #[serde(default)]
    pub fenestration: Vec<FenestrationEntry>,
    #[serde(default)]
    pub opaque_doors: Vec<OpaqueDoorEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseWalls {
    pub north: Option<TakeoffWall>,
    pub east: Option<TakeoffWall>,
    pub south: Option<TakeoffWall>,
    pub west: Option<TakeoffWall>,
}

impl HouseWalls {
    pub fn get(&self, key: WallKey) -> Option<&TakeoffWall> {
        match key {
            WallKey::North => self.north.as_ref(),
            WallKey::East => self.east.as_ref(),
            WallKey::South => self.south.as_ref(),
            WallKey::West => self.west.as_ref(),
        }
    }

    pub fn get_or_insert_mut(&mut self, key: WallKey) -> &mut TakeoffWall {
        let slot = match key {
            WallKey::North => &mut self.north,
            WallKey::East => &mut self.east,
            WallKey::South => &mut self.south,
            WallKey::West => &mut self.west,
        };
        slot.get_or_insert_with(TakeoffWall::default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (WallKey, &TakeoffWall)> {
        WallKey::ALL.into_iter().filter_map(move |k| self.get(k).map(|w| (k, w)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedZone {
    pub name: String,
    pub floor_area: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnconditionedZone {
    pub name: String,
    pub floor_area: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalBoundary {
    #[serde(default)]
    pub conditioned_zones: Vec<ConditionedZone>,
    #[serde(default)]
    pub unconditioned_zones: Vec<UnconditionedZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ceiling {
    pub name: String,
    pub ceiling_type: Option<String>,
    pub construction: Option<String>,
    pub area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabFloor {
    pub name: String,
    pub area: Option<f64>,
    pub perimeter: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvacSystem {
    pub name: String,
    pub system_type: Option<String>,
    pub capacity: Option<f64>,
    pub efficiency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhwSystem {
    pub name: String,
    pub system_type: Option<String>,
    pub tank_size_gal: Option<f64>,
    pub efficiency: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    High,
    Medium,
    Low,
}

/// A note attached to an extracted value the extractor had low confidence
/// in, referencing a dotted field path (same path grammar as `Value`
/// flattening in `verify::flatten`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyFlag {
    pub field_path: String,
    pub severity: FlagSeverity,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeoffSpec {
    pub project: ProjectInfo,
    #[serde(default)]
    pub house_walls: HouseWalls,
    #[serde(default)]
    pub thermal_boundary: ThermalBoundary,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(default)]
    pub slab_floors: Vec<SlabFloor>,
    #[serde(default)]
    pub hvac_systems: Vec<HvacSystem>,
    #[serde(default)]
    pub dhw_systems: Vec<DhwSystem>,
    #[serde(default)]
    pub uncertainty_flags: Vec<UncertaintyFlag>,
}

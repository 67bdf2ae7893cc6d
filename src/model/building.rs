//! The canonical, component-list representation used for verification.
//! Produced by transforming a `TakeoffSpec` (`merge::transform`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::takeoff::{Ceiling, ConditionedZone, DhwSystem, HvacSystem, ProjectInfo, SlabFloor, UnconditionedZone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub name: String,
    pub gross_area: f64,
    pub azimuth: f64,
    pub tilt: f64,
    pub construction: Option<String>,
    pub window_area: f64,
    pub door_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub name: String,
    /// Must match some `Wall.name` in the same `BuildingSpec`.
    pub wall: String,
    pub area: f64,
    pub azimuth: f64,
    pub u_factor: Option<f64>,
    pub shgc: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success,
    Failed,
}

/// Per-domain extraction outcome, recorded independently of whether that
/// domain's data made it into the merged `TakeoffSpec` (§4.6, §9 B.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStatus {
    pub status: ExtractionOutcome,
    pub retry_count: u32,
    pub item_count: Option<u32>,
    pub error: Option<String>,
}

/// A conflict recorded during dedup-by-name (§4.7). `first_occurrence_source`
/// per SPEC_FULL §D.2 — a self-conflict is possible when two items from the
/// same extractor share a name, and the field name no longer implies the
/// two sources differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConflict {
    pub field: String,
    pub item_name: String,
    pub first_occurrence_source: String,
    pub conflicting_source: String,
    pub resolution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub conditioned_floor_area: Option<f64>,
    pub total_wall_area: Option<f64>,
    pub total_window_area: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub project: ProjectInfo,
    #[serde(default)]
    pub envelope: Envelope,
    #[serde(default)]
    pub zones: Vec<ConditionedZone>,
    #[serde(default)]
    pub unconditioned_zones: Vec<UnconditionedZone>,
    #[serde(default)]
    pub walls: Vec<Wall>,
    #[serde(default)]
    pub windows: Vec<Window>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(default)]
    pub slab_floors: Vec<SlabFloor>,
    #[serde(default)]
    pub hvac_systems: Vec<HvacSystem>,
    #[serde(default)]
    pub dhw_systems: Vec<DhwSystem>,
    #[serde(default)]
    pub extraction_status: HashMap<String, ExtractionStatus>,
    #[serde(default)]
    pub conflicts: Vec<ExtractionConflict>,
}

impl BuildingSpec {
    /// Spec §8 invariant: every window's `wall` matches some wall's name,
    /// and every azimuth is in [0, 360).
    pub fn validate_window_wall_refs(&self) -> bool {
        self.windows.iter().all(|w| {
            w.azimuth >= 0.0 && w.azimuth < 360.0 && self.walls.iter().any(|wall| wall.name == w.wall)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_wall_ref_validates() {
        let mut b = BuildingSpec::default();
        b.walls.push(Wall {
            name: "N Wall".into(),
            gross_area: 100.0,
            azimuth: 0.0,
            tilt: 90.0,
            construction: None,
            window_area: 0.0,
            door_area: 0.0,
        });
        b.windows.push(Window {
            name: "W1".into(),
            wall: "N Wall".into(),
            area: 15.0,
            azimuth: 0.0,
            u_factor: None,
            shgc: None,
        });
        assert!(b.validate_window_wall_refs());
    }

    #[test]
    fn test_window_dangling_wall_ref_fails() {
        let mut b = BuildingSpec::default();
        b.windows.push(Window {
            name: "W1".into(),
            wall: "Ghost Wall".into(),
            area: 15.0,
            azimuth: 0.0,
            u_factor: None,
            shgc: None,
        });
        assert!(!b.validate_window_wall_refs());
    }
}

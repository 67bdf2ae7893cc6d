//! Merge/transform. Deduplicates domain-extractor output by name,
//! records conflicts, builds the orientation-keyed `TakeoffSpec`, and
//! transforms it into the flat, component-list `BuildingSpec` used by the
//! verifier.

use serde::Deserialize;

use crate::model::building::{BuildingSpec, Envelope, ExtractionConflict, Wall, Window};
use crate::model::takeoff::{
    Ceiling, ConditionedZone, DhwSystem, FenestrationEntry, HvacSystem, OpaqueDoorEntry, ProjectInfo, SlabFloor,
    TakeoffSpec, TakeoffWall, ThermalBoundary, UnconditionedZone, WallKey,
};

/// One wall as emitted by the zones domain, keyed to a cardinal direction
/// before it is placed under `house_walls`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawWall {
    pub name: String,
    pub wall_key: WallKey,
    pub gross_area: Option<f64>,
    pub azimuth: Option<f64>,
    pub construction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZonesPayload {
    #[serde(default)]
    pub walls: Vec<RawWall>,
    #[serde(default)]
    pub conditioned_zones: Vec<ConditionedZone>,
    #[serde(default)]
    pub unconditioned_zones: Vec<UnconditionedZone>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(default)]
    pub slab_floors: Vec<SlabFloor>,
}

/// One cardinal wall's fenestration/doors in the (preferred) nested form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NestedWallWindows {
    pub wall_key: WallKey,
    #[serde(default)]
    pub fenestration: Vec<FenestrationEntry>,
    #[serde(default)]
    pub opaque_doors: Vec<OpaqueDoorEntry>,
}

/// Legacy flat window form: each window names its own wall and azimuth,
/// requiring azimuth-octant bucketing into a cardinal wall.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlatWindow {
    pub name: String,
    pub area: f64,
    #[serde(default = "one")]
    pub multiplier: f64,
    pub u_factor: Option<f64>,
    pub shgc: Option<f64>,
    pub azimuth: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowsPayload {
    Nested(Vec<NestedWallWindows>),
    Flat(Vec<FlatWindow>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HvacPayload {
    #[serde(default)]
    pub hvac_systems: Vec<HvacSystem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DhwPayload {
    #[serde(default)]
    pub dhw_systems: Vec<DhwSystem>,
}

/// Whatever made it through domain fan-out; any field may be absent
/// when that domain's extraction failed both attempts.
#[derive(Debug, Clone, Default)]
pub struct DomainPayloads {
    pub zones: Option<ZonesPayload>,
    pub windows: Option<WindowsPayload>,
    pub hvac: Option<HvacPayload>,
    pub dhw: Option<DhwPayload>,
}

/// Dedups `items` by `name_of`, keeping the first occurrence and recording
/// a conflict (per SPEC_FULL §D.2, field `first_occurrence_source`) for
/// every later occurrence whose value differs from the kept one. Items
/// with no name are dropped silently.
pub fn dedup_by_name<T: Clone + PartialEq>(source: &str, items: Vec<T>, name_of: impl Fn(&T) -> &str) -> (Vec<T>, Vec<ExtractionConflict>) {
    let mut kept: Vec<T> = Vec::new();
    let mut kept_names: Vec<String> = Vec::new();
    let mut conflicts = Vec::new();

    for item in items {
        let name = name_of(&item);
        if name.is_empty() {
            continue;
        }
        if let Some(idx) = kept_names.iter().position(|n| n == name) {
            if kept[idx] != item {
                conflicts.push(ExtractionConflict {
                    field: "array_item".to_string(),
                    item_name: name.to_string(),
                    first_occurrence_source: source.to_string(),
                    conflicting_source: source.to_string(),
                    resolution: "kept_first".to_string(),
                });
            }
        } else {
            kept_names.push(name.to_string());
            kept.push(item);
        }
    }

    (kept, conflicts)
}

/// Azimuth-octant bucketing for legacy flat window output:
/// `315<=a<45 -> north`, `45<=a<135 -> east`, `135<=a<225 -> south`,
/// `225<=a<315 -> west`.
pub fn azimuth_to_wall_key(azimuth: f64) -> WallKey {
    let a = azimuth.rem_euclid(360.0);
    if !(45.0..225.0).contains(&a) {
        if a < 45.0 || a >= 315.0 {
            WallKey::North
        } else {
            WallKey::West
        }
    } else if a < 135.0 {
        WallKey::East
    } else {
        WallKey::South
    }
}

/// Builds the orientation-keyed `TakeoffSpec` from whatever domain payloads
/// survived fan-out, deduping each domain's named lists and collecting the
/// resulting conflicts.
pub fn build_takeoff(project: ProjectInfo, payloads: &DomainPayloads) -> (TakeoffSpec, Vec<ExtractionConflict>) {
    let mut conflicts = Vec::new();
    let mut spec = TakeoffSpec {
        project,
        ..Default::default()
    };

    if let Some(zones) = &payloads.zones {
        let (walls, wall_conflicts) = dedup_by_name("zones", zones.walls.clone(), |w: &RawWall| w.name.as_str());
        conflicts.extend(wall_conflicts);
        for wall in walls {
            let slot = spec.house_walls.get_or_insert_mut(wall.wall_key);
            slot.gross_area = wall.gross_area;
            slot.azimuth = wall.azimuth;
            slot.construction = wall.construction;
        }

        let (conditioned, c1) = dedup_by_name("zones", zones.conditioned_zones.clone(), |z: &ConditionedZone| z.name.as_str());
        let (unconditioned, c2) = dedup_by_name("zones", zones.unconditioned_zones.clone(), |z: &UnconditionedZone| z.name.as_str());
        conflicts.extend(c1);
        conflicts.extend(c2);
        spec.thermal_boundary = ThermalBoundary {
            conditioned_zones: conditioned,
            unconditioned_zones: unconditioned,
        };

        let (ceilings, c3) = dedup_by_name("zones", zones.ceilings.clone(), |c: &Ceiling| c.name.as_str());
        let (slabs, c4) = dedup_by_name("zones", zones.slab_floors.clone(), |s: &SlabFloor| s.name.as_str());
        conflicts.extend(c3);
        conflicts.extend(c4);
        spec.ceilings = ceilings;
        spec.slab_floors = slabs;
    }

    if let Some(windows) = &payloads.windows {
        match windows {
            WindowsPayload::Nested(per_wall) => {
                for entry in per_wall {
                    let (fenestration, c) = dedup_by_name("windows", entry.fenestration.clone(), |f: &FenestrationEntry| f.name.as_str());
                    conflicts.extend(c);
                    let (doors, c) = dedup_by_name("windows", entry.opaque_doors.clone(), |d: &OpaqueDoorEntry| d.name.as_str());
                    conflicts.extend(c);
                    let slot = spec.house_walls.get_or_insert_mut(entry.wall_key);
                    slot.fenestration = fenestration;
                    slot.opaque_doors = doors;
                }
            }
            WindowsPayload::Flat(flat) => {
                let (deduped, c) = dedup_by_name("windows", flat.clone(), |w: &FlatWindow| w.name.as_str());
                conflicts.extend(c);
                for window in deduped {
                    let wall_key = azimuth_to_wall_key(window.azimuth);
                    let slot = spec.house_walls.get_or_insert_mut(wall_key);
                    slot.fenestration.push(FenestrationEntry {
                        name: window.name,
                        area: window.area,
                        multiplier: window.multiplier,
                        u_factor: window.u_factor,
                        shgc: window.shgc,
                    });
                }
            }
        }
    }

    if let Some(hvac) = &payloads.hvac {
        let (systems, c) = dedup_by_name("hvac", hvac.hvac_systems.clone(), |h: &HvacSystem| h.name.as_str());
        conflicts.extend(c);
        spec.hvac_systems = systems;
    }

    if let Some(dhw) = &payloads.dhw {
        let (systems, c) = dedup_by_name("dhw", dhw.dhw_systems.clone(), |d: &DhwSystem| d.name.as_str());
        conflicts.extend(c);
        spec.dhw_systems = systems;
    }

    (spec, conflicts)
}

fn is_cathedral_or_vaulted(ceiling: &Ceiling) -> bool {
    let haystacks = [
        ceiling.name.to_lowercase(),
        ceiling.ceiling_type.clone().unwrap_or_default().to_lowercase(),
        ceiling.construction.clone().unwrap_or_default().to_lowercase(),
    ];
    haystacks.iter().any(|h| h.contains("cathedral") || h.contains("vaulted"))
}

/// Transforms the orientation-keyed `TakeoffSpec` into the flat,
/// component-list `BuildingSpec`. `extraction_status` and
/// `conflicts` are attached by the caller (orchestrator), which also
/// runs the parallel `ExtractionStatus` path.
pub fn transform(takeoff: &TakeoffSpec) -> BuildingSpec {
    let mut walls = Vec::new();
    let mut windows = Vec::new();

    for key in WallKey::ALL {
        let Some(wall) = takeoff.house_walls.get(key) else { continue };
        let azimuth = wall.azimuth.unwrap_or_else(|| key.default_azimuth());
        let window_area: f64 = wall.fenestration.iter().map(|f| f.area * f.multiplier).sum();
        let door_area: f64 = wall.opaque_doors.iter().map(|d| d.area).sum();

        walls.push(Wall {
            name: key.wall_name().to_string(),
            gross_area: wall.gross_area.unwrap_or(0.0),
            azimuth,
            tilt: 90.0,
            construction: wall.construction.clone(),
            window_area,
            door_area,
        });

        for f in &wall.fenestration {
            windows.push(Window {
                name: f.name.clone(),
                wall: key.wall_name().to_string(),
                area: f.area,
                azimuth,
                u_factor: f.u_factor,
                shgc: f.shgc,
            });
        }
    }

    let ceilings: Vec<Ceiling> = takeoff.ceilings.iter().filter(|c| is_cathedral_or_vaulted(c)).cloned().collect();

    let total_wall_area: f64 = walls.iter().map(|w| w.gross_area).sum();
    let total_window_area: f64 = walls.iter().map(|w| w.window_area).sum();

    BuildingSpec {
        project: takeoff.project.clone(),
        envelope: Envelope {
            conditioned_floor_area: takeoff.project.conditioned_floor_area,
            total_wall_area: Some(total_wall_area),
            total_window_area: Some(total_window_area),
        },
        zones: takeoff.thermal_boundary.conditioned_zones.clone(),
        unconditioned_zones: takeoff.thermal_boundary.unconditioned_zones.clone(),
        walls,
        windows,
        ceilings,
        slab_floors: takeoff.slab_floors.clone(),
        hvac_systems: takeoff.hvac_systems.clone(),
        dhw_systems: takeoff.dhw_systems.clone(),
        extraction_status: Default::default(),
        conflicts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_and_records_conflict_on_value_diff() {
        let walls = vec![
            RawWall { name: "N Wall".into(), wall_key: WallKey::North, gross_area: Some(100.0), azimuth: None, construction: None },
            RawWall { name: "N Wall".into(), wall_key: WallKey::North, gross_area: Some(120.0), azimuth: None, construction: None },
        ];
        let (kept, conflicts) = dedup_by_name("zones", walls, |w| w.name.as_str());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].gross_area, Some(100.0));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "array_item");
        assert_eq!(conflicts[0].first_occurrence_source, "zones");
        assert_eq!(conflicts[0].conflicting_source, "zones");
    }

    #[test]
    fn test_dedup_drops_nameless_items_silently() {
        let walls = vec![RawWall { name: String::new(), wall_key: WallKey::East, gross_area: None, azimuth: None, construction: None }];
        let (kept, conflicts) = dedup_by_name("zones", walls, |w| w.name.as_str());
        assert!(kept.is_empty());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_azimuth_octant_bucketing() {
        assert_eq!(azimuth_to_wall_key(10.0), WallKey::North);
        assert_eq!(azimuth_to_wall_key(350.0), WallKey::North);
        assert_eq!(azimuth_to_wall_key(90.0), WallKey::East);
        assert_eq!(azimuth_to_wall_key(180.0), WallKey::South);
        assert_eq!(azimuth_to_wall_key(270.0), WallKey::West);
    }

    #[test]
    fn test_flat_windows_bucket_into_cardinal_walls() {
        let project = ProjectInfo::default();
        let payloads = DomainPayloads {
            windows: Some(WindowsPayload::Flat(vec![FlatWindow {
                name: "W1".into(),
                area: 15.0,
                multiplier: 1.0,
                u_factor: Some(0.3),
                shgc: Some(0.25),
                azimuth: 95.0,
            }])),
            ..Default::default()
        };
        let (takeoff, conflicts) = build_takeoff(project, &payloads);
        assert!(conflicts.is_empty());
        let east = takeoff.house_walls.get(WallKey::East).unwrap();
        assert_eq!(east.fenestration.len(), 1);
        assert_eq!(east.fenestration[0].name, "W1");
    }

    #[test]
    fn test_transform_computes_window_and_door_area() {
        let mut takeoff = TakeoffSpec::default();
        let wall = takeoff.house_walls.get_or_insert_mut(WallKey::North);
        wall.gross_area = Some(200.0);
        wall.fenestration.push(FenestrationEntry { name: "W1".into(), area: 15.0, multiplier: 2.0, u_factor: None, shgc: None });
        wall.opaque_doors.push(OpaqueDoorEntry { name: "D1".into(), area: 20.0, u_factor: None });

        let building = transform(&takeoff);
        let wall = building.walls.iter().find(|w| w.name == "N Wall").unwrap();
        assert_eq!(wall.window_area, 30.0);
        assert_eq!(wall.door_area, 20.0);
        assert_eq!(wall.azimuth, 0.0);
        assert_eq!(building.windows.len(), 1);
        assert_eq!(building.windows[0].wall, "N Wall");
        assert_eq!(building.windows[0].azimuth, 0.0);
    }

    #[test]
    fn test_transform_drops_non_cathedral_ceilings() {
        let mut takeoff = TakeoffSpec::default();
        takeoff.ceilings.push(Ceiling { name: "Attic Ceiling".into(), ceiling_type: Some("attic".into()), construction: None, area: Some(1000.0) });
        takeoff.ceilings.push(Ceiling { name: "Great Room".into(), ceiling_type: Some("Vaulted".into()), construction: None, area: Some(300.0) });

        let building = transform(&takeoff);
        assert_eq!(building.ceilings.len(), 1);
        assert_eq!(building.ceilings[0].name, "Great Room");
    }

    #[test]
    fn test_transform_uses_explicit_azimuth_over_default() {
        let mut takeoff = TakeoffSpec::default();
        let wall = takeoff.house_walls.get_or_insert_mut(WallKey::North);
        wall.azimuth = Some(12.5);
        let building = transform(&takeoff);
        assert_eq!(building.walls[0].azimuth, 12.5);
    }
}

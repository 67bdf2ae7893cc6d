//! Page router. Closed-form mapping from a domain name to a sorted,
//! unique list of global page numbers. Falls back to a
//! coarse-type-only rule table for legacy caches with no subtype/tag
//! classification (SPEC_FULL §D.3).

use crate::error::{Error, Result};
use crate::model::document::{ContentTag, DocumentMap, PageSubtype, PageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Orientation,
    Zones,
    Windows,
    Hvac,
    Dhw,
    Project,
}

impl Domain {
    pub fn name(self) -> &'static str {
        match self {
            Domain::Orientation => "orientation",
            Domain::Zones => "zones",
            Domain::Windows => "windows",
            Domain::Hvac => "hvac",
            Domain::Dhw => "dhw",
            Domain::Project => "project",
        }
    }
}

fn matches_current(page: &crate::model::document::PageInfo, subtypes: &[PageSubtype], tags: &[ContentTag]) -> bool {
    let subtype_match = page.subtype.map(|s| subtypes.contains(&s)).unwrap_or(false);
    let tag_match = page.tags.iter().any(|t| tags.contains(t));
    subtype_match || tag_match
}

fn current_rules(domain: Domain) -> (Vec<PageSubtype>, Vec<ContentTag>) {
    use ContentTag::*;
    use PageSubtype::*;
    match domain {
        Domain::Orientation => (vec![SitePlan, FloorPlan, Elevation], vec![NorthArrow]),
        Domain::Zones => (
            vec![FloorPlan, Section, Detail, EnergySummary, RoomSchedule, WallSchedule],
            vec![RoomLabels, AreaCallouts, CeilingHeights, WallAssembly, InsulationValues],
        ),
        Domain::Windows => (
            vec![WindowSchedule, Elevation, FloorPlan, EnergySummary],
            vec![GlazingPerformance, WindowCallouts],
        ),
        Domain::Hvac => (
            vec![EquipmentSchedule, MechanicalPlan, EnergySummary],
            vec![HvacEquipment, HvacSpecs],
        ),
        Domain::Dhw => (
            vec![EquipmentSchedule, PlumbingPlan, EnergySummary],
            vec![WaterHeater, DhwSpecs],
        ),
        Domain::Project => (vec![EnergySummary, SitePlan], vec![]),
    }
}

fn route_current(doc_map: &DocumentMap, domain: Domain) -> Vec<u32> {
    if domain == Domain::Project {
        return route_project_current(doc_map);
    }
    let (subtypes, tags) = current_rules(domain);
    let mut pages: Vec<u32> = doc_map
        .pages
        .iter()
        .filter(|p| matches_current(p, &subtypes, &tags))
        .map(|p| p.page_number)
        .collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// `project` also pulls in "schedules + CBECC" (coarse types, not just
/// subtypes) plus the first three floor plans.
fn route_project_current(doc_map: &DocumentMap) -> Vec<u32> {
    let mut pages: Vec<u32> = doc_map
        .pages
        .iter()
        .filter(|p| {
            p.page_type == PageType::Schedule
                || p.page_type == PageType::Cbecc
                || p.subtype == Some(PageSubtype::EnergySummary)
                || p.subtype == Some(PageSubtype::SitePlan)
        })
        .map(|p| p.page_number)
        .collect();

    let first_three_floor_plans: Vec<u32> = doc_map
        .pages
        .iter()
        .filter(|p| p.subtype == Some(PageSubtype::FloorPlan))
        .take(3)
        .map(|p| p.page_number)
        .collect();

    pages.extend(first_three_floor_plans);
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Legacy fallback, coarse types only (SPEC_FULL §D.3).
fn route_legacy(doc_map: &DocumentMap, domain: Domain) -> Vec<u32> {
    let by_type = |types: &[PageType]| -> Vec<u32> {
        doc_map
            .pages
            .iter()
            .filter(|p| types.contains(&p.page_type))
            .map(|p| p.page_number)
            .collect()
    };

    let mut pages = match domain {
        Domain::Orientation => by_type(&[PageType::Drawing]),
        Domain::Zones => by_type(&[PageType::Drawing]),
        Domain::Windows => by_type(&[PageType::Schedule, PageType::Drawing]),
        Domain::Hvac => by_type(&[PageType::Schedule, PageType::Cbecc]),
        Domain::Dhw => by_type(&[PageType::Schedule, PageType::Cbecc]),
        Domain::Project => {
            let mut pages = by_type(&[PageType::Schedule, PageType::Cbecc]);
            if let Some(first_drawing) = doc_map
                .pages
                .iter()
                .filter(|p| p.page_type == PageType::Drawing)
                .map(|p| p.page_number)
                .min()
            {
                pages.push(first_drawing);
            }
            pages
        }
    };
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Resolves the relevant global page numbers for `domain`, using the
/// legacy coarse-type fallback when `doc_map` predates subtype/tag
/// classification.
pub fn route(doc_map: &DocumentMap, domain: Domain) -> Result<Vec<u32>> {
    let pages = if doc_map.is_legacy() {
        route_legacy(doc_map, domain)
    } else {
        route_current(doc_map, domain)
    };

    if pages.is_empty() {
        return Err(Error::NoPagesForDomain(domain.name().to_string()));
    }
    Ok(pages)
}

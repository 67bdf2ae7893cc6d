//! SourcePDF, PageInfo, and the cached DocumentMap produced by discovery.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Schedule,
    Cbecc,
    Drawing,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSubtype {
    SitePlan,
    FloorPlan,
    Elevation,
    Section,
    Detail,
    MechanicalPlan,
    PlumbingPlan,
    WindowSchedule,
    EquipmentSchedule,
    RoomSchedule,
    WallSchedule,
    DoorSchedule,
    EnergySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTag {
    NorthArrow,
    RoomLabels,
    WindowCallouts,
    HvacSpecs,
    AreaCallouts,
    CeilingHeights,
    WallAssembly,
    InsulationValues,
    GlazingPerformance,
    HvacEquipment,
    WaterHeater,
    DhwSpecs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Rank used by reconciliation tie-breaking (§4.1, §4.5): higher wins.
    pub fn rank(self) -> u8 {
        match self {
            Confidence::High => 3,
            Confidence::Medium => 2,
            Confidence::Low => 1,
        }
    }
}

/// One input PDF: filename and page count. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePdf {
    pub filename: String,
    pub page_count: u32,
}

/// A back-reference from a global page number to its source PDF and local
/// (1-indexed, within that PDF) page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOrigin {
    pub source_pdf: String,
    pub local_page_number: u32,
}

/// One page of the compliance package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Globally unique 1-indexed page number across all source PDFs.
    pub page_number: u32,
    pub origin: PageOrigin,
    pub page_type: PageType,
    pub subtype: Option<PageSubtype>,
    #[serde(default)]
    pub tags: Vec<ContentTag>,
    pub confidence: Confidence,
    #[serde(default)]
    pub description: String,
}

/// The classified structure of an evaluation's source PDFs, built once by
/// discovery and persisted to a cache file keyed by `cache_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMap {
    pub cache_version: u32,
    pub total_pages: u32,
    pub pages: Vec<PageInfo>,
    pub source_pdfs: HashMap<String, SourcePdf>,
}

impl DocumentMap {
    /// Invariant check: every page index 1..=total_pages appears exactly once.
    pub fn validate_page_numbering(&self) -> bool {
        if self.pages.len() as u32 != self.total_pages {
            return false;
        }
        let mut seen = vec![false; self.total_pages as usize + 1];
        for p in &self.pages {
            if p.page_number == 0 || p.page_number > self.total_pages {
                return false;
            }
            let idx = p.page_number as usize;
            if seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        seen.iter().skip(1).all(|&x| x)
    }

    pub fn page(&self, page_number: u32) -> Option<&PageInfo> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    /// Whether this map predates subtype/tag classification (legacy cache),
    /// used by the page router's fallback path.
    pub fn is_legacy(&self) -> bool {
        self.pages
            .iter()
            .all(|p| p.subtype.is_none() && p.tags.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page(n: u32, page_type: PageType) -> PageInfo {
        PageInfo {
            page_number: n,
            origin: PageOrigin {
                source_pdf: "plans.pdf".into(),
                local_page_number: n,
            },
            page_type,
            subtype: None,
            tags: vec![],
            confidence: Confidence::High,
            description: String::new(),
        }
    }

    #[test]
    fn test_valid_page_numbering() {
        let map = DocumentMap {
            cache_version: 1,
            total_pages: 3,
            pages: vec![
                sample_page(1, PageType::Drawing),
                sample_page(2, PageType::Schedule),
                sample_page(3, PageType::Other),
            ],
            source_pdfs: HashMap::new(),
        };
        assert!(map.validate_page_numbering());
    }

    #[test]
    fn test_invalid_page_numbering_gap() {
        let map = DocumentMap {
            cache_version: 1,
            total_pages: 3,
            pages: vec![sample_page(1, PageType::Drawing), sample_page(3, PageType::Other)],
            source_pdfs: HashMap::new(),
        };
        assert!(!map.validate_page_numbering());
    }

    #[test]
    fn test_legacy_detection() {
        let map = DocumentMap {
            cache_version: 1,
            total_pages: 1,
            pages: vec![sample_page(1, PageType::Drawing)],
            source_pdfs: HashMap::new(),
        };
        assert!(map.is_legacy());
    }

    #[test]
    fn test_confidence_rank_order() {
        assert!(Confidence::High.rank() > Confidence::Medium.rank());
        assert!(Confidence::Medium.rank() > Confidence::Low.rank());
    }
}

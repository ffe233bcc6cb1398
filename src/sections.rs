// 🧭 Section Locator - find the four stacked sections by their marker rows

use crate::error::{LedgerError, Result};
use crate::grid::RawGrid;
use crate::model::SectionKind;
use serde::{Deserialize, Serialize};

/// How marker rows are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelScan {
    /// Trimmed text of column 0 equals the marker.
    #[default]
    FirstColumn,
    /// The marker appears anywhere in the row's non-empty cells joined by a
    /// space. Free text containing a marker (a supplier called
    /// `BALANCE STOCK DEPOT`) opens that section too.
    WholeRow,
}

/// Row range owned by one section. `data_end_index` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionBounds {
    pub kind: SectionKind,
    pub sentinel_row_index: usize,
    /// Local header row directly below the marker, when the layout has one.
    pub header_row_index: Option<usize>,
    pub data_start_index: usize,
    pub data_end_index: usize,
}

impl SectionBounds {
    pub fn data_rows(&self) -> std::ops::Range<usize> {
        self.data_start_index..self.data_end_index
    }
}

/// Located sections in sheet order. Balance may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLayout {
    sections: Vec<SectionBounds>,
}

impl SectionLayout {
    pub fn get(&self, kind: SectionKind) -> Option<&SectionBounds> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionBounds> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn row_matches(grid: &RawGrid, row: usize, sentinel: &str, scan: SentinelScan) -> bool {
    match scan {
        SentinelScan::FirstColumn => grid.cell(row, 0).as_text() == sentinel,
        SentinelScan::WholeRow => {
            let joined = grid
                .row(row)
                .iter()
                .filter(|cell| !cell.is_empty())
                .map(|cell| cell.as_text())
                .collect::<Vec<_>>()
                .join(" ");
            joined.contains(sentinel)
        }
    }
}

/// Scan the grid top to bottom for the section markers.
///
/// Only the first occurrence of each marker counts; later repeats are
/// ignored. With `local_header_row`, the row after each marker is the
/// section's header and data begins one row later.
pub fn locate_sections(
    grid: &RawGrid,
    scan: SentinelScan,
    local_header_row: bool,
) -> Result<SectionLayout> {
    let mut found: Vec<(SectionKind, usize)> = Vec::new();

    for row in 0..grid.len() {
        for kind in SectionKind::ALL {
            if found.iter().any(|(k, _)| *k == kind) {
                continue;
            }
            if row_matches(grid, row, kind.sentinel(), scan) {
                found.push((kind, row));
                // a row opens at most one section
                break;
            }
        }
    }

    for kind in SectionKind::ALL {
        if kind.is_mandatory() && !found.iter().any(|(k, _)| *k == kind) {
            return Err(LedgerError::MissingSection(kind));
        }
    }

    // found is in row order; kinds must be too
    for pair in found.windows(2) {
        let (first_kind, first_row) = pair[0];
        let (second_kind, second_row) = pair[1];
        if second_kind < first_kind {
            return Err(LedgerError::SectionOrder {
                earlier: second_kind,
                earlier_row: second_row,
                later: first_kind,
                later_row: first_row,
            });
        }
    }

    let mut sections = Vec::with_capacity(found.len());
    for (i, (kind, sentinel_row)) in found.iter().enumerate() {
        let end = found
            .get(i + 1)
            .map(|(_, next_row)| *next_row)
            .unwrap_or_else(|| grid.len());
        let header_row_index = if local_header_row && sentinel_row + 1 < end {
            Some(sentinel_row + 1)
        } else {
            None
        };
        let offset = if local_header_row { 2 } else { 1 };
        let start = (sentinel_row + offset).min(end);

        let bounds = SectionBounds {
            kind: *kind,
            sentinel_row_index: *sentinel_row,
            header_row_index,
            data_start_index: start,
            data_end_index: end,
        };
        log::debug!(
            "section {:?}: marker row {}, data rows {}..{}",
            kind,
            sentinel_row,
            start,
            end
        );
        sections.push(bounds);
    }

    Ok(SectionLayout { sections })
}

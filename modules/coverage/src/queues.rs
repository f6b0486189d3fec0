use reconbook_core::ScanIntent;
use serde::Serialize;

use crate::CoverageMatrix;

/// One (segment, intent) cell that still has missing hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub segment_key: String,
    pub segment_label: String,
    pub intent: ScanIntent,
    pub host_total: usize,
    pub missing_count: usize,
    pub coverage_percent: u32,
}

/// Next scan step for a segment: the first intent, in display order, that is
/// not fully covered. `next_intent` is `None` once every intent is at 100%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub segment_key: String,
    pub segment_label: String,
    pub host_total: usize,
    pub completed_intents: usize,
    pub next_intent: Option<ScanIntent>,
    pub missing_count: usize,
}

/// Largest gaps first; ties by segment key, then intent order.
pub fn coverage_gaps(matrix: &CoverageMatrix) -> Vec<CoverageGap> {
    let mut gaps: Vec<CoverageGap> = matrix
        .segments
        .iter()
        .flat_map(|s| {
            s.cells.iter().filter(|c| c.missing_count > 0).map(move |c| CoverageGap {
                segment_key: s.key.clone(),
                segment_label: s.label.clone(),
                intent: c.intent,
                host_total: s.host_total,
                missing_count: c.missing_count,
                coverage_percent: c.coverage_percent,
            })
        })
        .collect();
    gaps.sort_by(|a, b| {
        b.missing_count
            .cmp(&a.missing_count)
            .then_with(|| a.segment_key.cmp(&b.segment_key))
            .then_with(|| a.intent.cmp(&b.intent))
    });
    gaps
}

/// One milestone per non-empty segment, in matrix order.
pub fn next_milestones(matrix: &CoverageMatrix) -> Vec<Milestone> {
    matrix
        .segments
        .iter()
        .filter(|s| s.host_total > 0)
        .map(|s| {
            let next = s.cells.iter().find(|c| c.missing_count > 0);
            Milestone {
                segment_key: s.key.clone(),
                segment_label: s.label.clone(),
                host_total: s.host_total,
                completed_intents: s.cells.iter().filter(|c| c.missing_count == 0).count(),
                next_intent: next.map(|c| c.intent),
                missing_count: next.map_or(0, |c| c.missing_count),
            }
        })
        .collect()
}

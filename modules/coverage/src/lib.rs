//! Intent coverage: for every segment and every scan intent, how many of the
//! segment's hosts were ever observed by an import tagged with that intent.

mod queues;

pub use queues::{coverage_gaps, next_milestones, CoverageGap, Milestone};

use observation_store::{Db, Error, ProjectId, Result};
use reconbook_core::{clamp_preview, parse_ipv4, Page, ScanIntent};
use segments::{load_segments, Segment, SegmentMode, Segmentation};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageOptions {
    /// Missing-host preview length per cell; default 5, capped at 50.
    pub preview_size: Option<usize>,
    pub include_preview: bool,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        CoverageOptions { preview_size: None, include_preview: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageCell {
    pub intent: ScanIntent,
    pub covered_count: usize,
    pub missing_count: usize,
    pub coverage_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_preview: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentCoverage {
    pub key: String,
    pub label: String,
    pub host_total: usize,
    /// One cell per intent, in intent display order.
    pub cells: Vec<CoverageCell>,
}

impl SegmentCoverage {
    pub fn cell(&self, intent: ScanIntent) -> Option<&CoverageCell> {
        self.cells.iter().find(|c| c.intent == intent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageMatrix {
    pub segment_mode: SegmentMode,
    pub segments: Vec<SegmentCoverage>,
}

impl CoverageMatrix {
    pub fn segment(&self, key: &str) -> Option<&SegmentCoverage> {
        self.segments.iter().find(|s| s.key == key)
    }
}

/// One page of a cell's missing hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingPage {
    pub segment_key: String,
    pub intent: ScanIntent,
    pub items: Vec<String>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// `floor(covered * 100 / total)`, and 0 for an empty segment.
pub fn coverage_percent(covered: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (covered.saturating_mul(100) / total) as u32
}

/// Observed IPs per intent, normalized to dotted-quad IPv4. Anything else is dropped.
pub type CoveredIps = HashMap<ScanIntent, HashSet<String>>;

fn normalize(raw: HashMap<ScanIntent, HashSet<String>>) -> CoveredIps {
    raw.into_iter()
        .map(|(intent, ips)| (intent, ips.iter().filter_map(|ip| parse_ipv4(ip)).map(|a| a.to_string()).collect()))
        .collect()
}

/// Hosts of `segment` never observed under `intent`, in segment (numeric) order.
pub fn missing_hosts(segment: &Segment, covered: &CoveredIps, intent: ScanIntent) -> Vec<String> {
    match covered.get(&intent) {
        Some(set) => segment.hosts.iter().filter(|h| !set.contains(*h)).cloned().collect(),
        None => segment.hosts.clone(),
    }
}

pub fn build_matrix(seg: &Segmentation, covered: &CoveredIps, opts: CoverageOptions) -> CoverageMatrix {
    let preview = clamp_preview(opts.preview_size);
    let segments = seg
        .segments
        .iter()
        .map(|s| {
            let host_total = s.hosts.len();
            let cells = ScanIntent::ALL
                .into_iter()
                .map(|intent| {
                    let missing = missing_hosts(s, covered, intent);
                    let missing_count = missing.len();
                    let covered_count = host_total - missing_count;
                    CoverageCell {
                        intent,
                        covered_count,
                        missing_count,
                        coverage_percent: coverage_percent(covered_count, host_total),
                        missing_preview: opts
                            .include_preview
                            .then(|| missing.into_iter().take(preview).collect()),
                    }
                })
                .collect();
            SegmentCoverage { key: s.key.clone(), label: s.label.clone(), host_total, cells }
        })
        .collect();
    CoverageMatrix { segment_mode: seg.mode, segments }
}

pub fn compute_coverage_matrix(db: &Db, project_id: ProjectId, opts: CoverageOptions) -> Result<CoverageMatrix> {
    let seg = load_segments(db, project_id)?;
    let covered = normalize(db.covered_ips_by_intent(project_id)?);
    let matrix = build_matrix(&seg, &covered, opts);
    debug!(project_id, mode = %matrix.segment_mode, segments = matrix.segments.len(), "coverage matrix computed");
    Ok(matrix)
}

/// Paginated drill-down into one cell. Unknown intent is a validation error,
/// unknown segment key is not-found, a page past the end is empty.
pub fn list_coverage_missing(
    db: &Db,
    project_id: ProjectId,
    segment_key: &str,
    intent: &str,
    page: Option<usize>,
    page_size: Option<usize>,
) -> Result<MissingPage> {
    let intent: ScanIntent = intent.parse()?;
    let window = Page::new(page, page_size)?;
    let seg = load_segments(db, project_id)?;
    let segment = seg.get(segment_key).ok_or_else(|| Error::not_found("segment", segment_key))?;
    let covered = normalize(db.covered_ips_by_intent(project_id)?);
    let missing = missing_hosts(segment, &covered, intent);
    debug!(project_id, segment = segment_key, %intent, total = missing.len(), page = window.page, "coverage drill-down");
    Ok(MissingPage {
        segment_key: segment.key.clone(),
        intent,
        items: window.slice(&missing),
        total: missing.len(),
        page: window.page,
        page_size: window.page_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use observation_store::{ErrorKind, NewHost, NewImport};
    use segments::UNMAPPED_KEY;

    fn scenario_one() -> (Db, ProjectId) {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        db.add_scope_definition(p, "10.0.0.0/24").unwrap();
        db.record_import(p, &NewImport::new("ping.xml").intent(ScanIntent::PingSweep).host(NewHost::new("10.0.0.5"))).unwrap();
        db.record_import(p, &NewImport::new("other.xml").host(NewHost::new("10.0.2.3").in_scope(true))).unwrap();
        (db, p)
    }

    #[test]
    fn percent_floors_and_handles_empty() {
        assert_eq!(coverage_percent(0, 0), 0);
        assert_eq!(coverage_percent(1, 3), 33);
        assert_eq!(coverage_percent(2, 3), 66);
        assert_eq!(coverage_percent(3, 3), 100);
    }

    #[test]
    fn scope_rule_and_unmapped_segments() {
        let (db, p) = scenario_one();
        let m = compute_coverage_matrix(&db, p, CoverageOptions::default()).unwrap();
        assert_eq!(m.segment_mode, SegmentMode::ScopeRules);
        assert_eq!(m.segments.len(), 2);

        let cidr = m.segments.iter().find(|s| s.label == "10.0.0.0/24").unwrap();
        let ping = cidr.cell(ScanIntent::PingSweep).unwrap();
        assert_eq!((ping.covered_count, ping.missing_count, ping.coverage_percent), (1, 0, 100));

        let unmapped = m.segment(UNMAPPED_KEY).unwrap();
        let ping = unmapped.cell(ScanIntent::PingSweep).unwrap();
        assert_eq!((ping.covered_count, ping.missing_count, ping.coverage_percent), (0, 1, 0));
        assert_eq!(ping.missing_preview.as_deref(), Some(&["10.0.2.3".to_string()][..]));
    }

    #[test]
    fn every_cell_adds_up() {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let mut imp = NewImport::new("tcp.xml").intent(ScanIntent::AllTcp);
        for i in 1..=7 {
            imp = imp.host(NewHost::new(format!("10.0.{}.{}", i % 2, i)));
        }
        db.record_import(p, &imp).unwrap();
        db.record_import(p, &NewImport::new("udp.xml").intent(ScanIntent::TopUdp).host(NewHost::new("10.0.1.1"))).unwrap();

        let m = compute_coverage_matrix(&db, p, CoverageOptions { preview_size: Some(2), include_preview: true }).unwrap();
        assert_eq!(m.segment_mode, SegmentMode::Fallback24);
        for s in &m.segments {
            let order: Vec<ScanIntent> = s.cells.iter().map(|c| c.intent).collect();
            assert_eq!(order, ScanIntent::ALL.to_vec());
            for c in &s.cells {
                assert_eq!(c.covered_count + c.missing_count, s.host_total);
                assert_eq!(c.coverage_percent, coverage_percent(c.covered_count, s.host_total));
                assert!(c.missing_preview.as_ref().unwrap().len() <= 2);
            }
        }
        let odd = m.segment("fallback:10.0.1.0/24").unwrap();
        assert_eq!(odd.host_total, 4);
        assert_eq!(odd.cell(ScanIntent::TopUdp).unwrap().coverage_percent, 25);
    }

    #[test]
    fn preview_can_be_disabled() {
        let (db, p) = scenario_one();
        let m = compute_coverage_matrix(&db, p, CoverageOptions { preview_size: None, include_preview: false }).unwrap();
        assert!(m.segments.iter().flat_map(|s| &s.cells).all(|c| c.missing_preview.is_none()));
    }

    #[test]
    fn drill_down_pages_and_errors() {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let mut imp = NewImport::new("a.xml");
        for i in 1..=12 {
            imp = imp.host(NewHost::new(format!("10.0.0.{i}")));
        }
        db.record_import(p, &imp).unwrap();

        let page = list_coverage_missing(&db, p, "fallback:10.0.0.0/24", "vuln_nse", Some(2), Some(5)).unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.items, vec!["10.0.0.6", "10.0.0.7", "10.0.0.8", "10.0.0.9", "10.0.0.10"]);

        let past = list_coverage_missing(&db, p, "fallback:10.0.0.0/24", "vuln_nse", Some(9), Some(5)).unwrap();
        assert!(past.items.is_empty());
        assert_eq!(past.total, 12);

        let err = list_coverage_missing(&db, p, "fallback:10.0.0.0/24", "full_scan", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = list_coverage_missing(&db, p, "scope:99", "ping_sweep", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

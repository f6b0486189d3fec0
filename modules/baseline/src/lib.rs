//! Expected-asset drift: declared baseline addresses against the hosts the
//! project currently knows about.

use observation_store::{BaselineDefinition, CurrentHost, Db, ProjectId, Result};
use reconbook_core::parse_ipv4;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaselineSummary {
    pub definitions: usize,
    pub expected_total: usize,
    pub observed_total: usize,
    pub expected_and_seen: usize,
    pub expected_but_unseen: usize,
    pub seen_but_out_of_scope: usize,
    pub out_of_baseline_marked_in_scope: usize,
    pub out_of_baseline_marked_out_of_scope: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaselineLists {
    pub expected_but_unseen: Vec<String>,
    pub seen_but_out_of_scope: Vec<CurrentHost>,
    /// Subsets of `seen_but_out_of_scope` split by the host's current flag.
    pub marked_in_scope: Vec<CurrentHost>,
    pub marked_out_of_scope: Vec<CurrentHost>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaselineReport {
    pub summary: BaselineSummary,
    pub lists: BaselineLists,
}

fn expected_set(defs: &[BaselineDefinition]) -> BTreeSet<u32> {
    let mut expected = BTreeSet::new();
    for def in defs {
        match def.target() {
            Some(target) => expected.extend(target.addresses()),
            None => warn!(baseline_id = def.id, definition = %def.definition, "skipping unparseable baseline row"),
        }
    }
    expected
}

/// Diff the expanded baseline against current IPv4 hosts. Hosts whose address
/// does not parse as IPv4 are left out of both sides.
pub fn evaluate(defs: &[BaselineDefinition], hosts: &[CurrentHost]) -> BaselineReport {
    let expected = expected_set(defs);
    let observed: BTreeMap<u32, &CurrentHost> = hosts
        .iter()
        .filter_map(|h| parse_ipv4(&h.ip).map(|a| (u32::from(a), h)))
        .collect();

    let expected_but_unseen: Vec<String> = expected
        .iter()
        .filter(|a| !observed.contains_key(*a))
        .map(|a| Ipv4Addr::from(*a).to_string())
        .collect();
    let seen_but_out_of_scope: Vec<CurrentHost> = observed
        .iter()
        .filter(|(a, _)| !expected.contains(*a))
        .map(|(_, h)| (*h).clone())
        .collect();
    let (marked_in_scope, marked_out_of_scope): (Vec<CurrentHost>, Vec<CurrentHost>) =
        seen_but_out_of_scope.iter().cloned().partition(|h| h.in_scope);

    let summary = BaselineSummary {
        definitions: defs.len(),
        expected_total: expected.len(),
        observed_total: observed.len(),
        expected_and_seen: expected.len() - expected_but_unseen.len(),
        expected_but_unseen: expected_but_unseen.len(),
        seen_but_out_of_scope: seen_but_out_of_scope.len(),
        out_of_baseline_marked_in_scope: marked_in_scope.len(),
        out_of_baseline_marked_out_of_scope: marked_out_of_scope.len(),
    };
    BaselineReport {
        summary,
        lists: BaselineLists { expected_but_unseen, seen_but_out_of_scope, marked_in_scope, marked_out_of_scope },
    }
}

pub fn evaluate_baseline(db: &Db, project_id: ProjectId) -> Result<BaselineReport> {
    db.require_project(project_id)?;
    let defs = db.baseline_definitions(project_id)?;
    let hosts = db.current_hosts(project_id)?;
    let report = evaluate(&defs, &hosts);
    debug!(project_id, summary = ?report.summary, "baseline evaluated");
    Ok(report)
}

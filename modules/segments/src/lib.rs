//! Segment resolution: group a project's in-scope IPv4 hosts by scope rule,
//! or by `/24` when the project has no rules. Recomputed on every call.

use observation_store::{CurrentHost, Db, ProjectId, Result, ScopeDefinition};
use reconbook_core::{parse_ipv4, slash24_key};
pub use reconbook_core::SegmentMode;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv4Addr;
use tracing::debug;

pub const UNMAPPED_KEY: &str = "scope:unmapped";

/// Named group of in-scope hosts. `hosts` is deduplicated and numerically sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub key: String,
    pub label: String,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    pub mode: SegmentMode,
    pub segments: Vec<Segment>,
}

impl Segmentation {
    pub fn get(&self, key: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.key == key)
    }
}

/// Segments may overlap when rules do. With rules, hosts matching none land
/// in `scope:unmapped` (omitted when empty). Non-IPv4 and out-of-scope hosts
/// are ignored.
pub fn resolve_segments(rules: &[ScopeDefinition], hosts: &[CurrentHost]) -> Segmentation {
    let addrs: BTreeSet<Ipv4Addr> = hosts
        .iter()
        .filter(|h| h.in_scope)
        .filter_map(|h| parse_ipv4(&h.ip))
        .collect();

    if rules.is_empty() {
        let mut buckets: BTreeMap<u32, (String, Vec<String>)> = BTreeMap::new();
        for a in &addrs {
            let net = u32::from(*a) & 0xffff_ff00;
            buckets
                .entry(net)
                .or_insert_with(|| (slash24_key(*a), Vec::new()))
                .1
                .push(a.to_string());
        }
        let segments = buckets
            .into_values()
            .map(|(cidr, hosts)| Segment { key: format!("fallback:{cidr}"), label: cidr, hosts })
            .collect();
        return Segmentation { mode: SegmentMode::Fallback24, segments };
    }

    let mut matched: HashSet<Ipv4Addr> = HashSet::new();
    let mut segments = Vec::with_capacity(rules.len() + 1);
    for rule in rules {
        let hosts: Vec<String> = match rule.target() {
            Some(t) => addrs
                .iter()
                .filter(|a| t.contains(**a))
                .inspect(|a| {
                    matched.insert(**a);
                })
                .map(|a| a.to_string())
                .collect(),
            None => Vec::new(),
        };
        segments.push(Segment { key: format!("scope:{}", rule.id), label: rule.definition.clone(), hosts });
    }
    let unmapped: Vec<String> = addrs.iter().filter(|a| !matched.contains(*a)).map(|a| a.to_string()).collect();
    if !unmapped.is_empty() {
        segments.push(Segment { key: UNMAPPED_KEY.to_string(), label: "unmapped".to_string(), hosts: unmapped });
    }
    Segmentation { mode: SegmentMode::ScopeRules, segments }
}

/// Resolve segments from the project's current scope rules and in-scope hosts.
pub fn load_segments(db: &Db, project_id: ProjectId) -> Result<Segmentation> {
    db.require_project(project_id)?;
    let rules = db.scope_definitions(project_id)?;
    let hosts = db.in_scope_hosts(project_id)?;
    let seg = resolve_segments(&rules, &hosts);
    debug!(project_id, mode = %seg.mode, segments = seg.segments.len(), hosts = hosts.len(), "segments resolved");
    Ok(seg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use observation_store::{ErrorKind, NewHost, NewImport};

    fn host(ip: &str, in_scope: bool) -> CurrentHost {
        CurrentHost {
            id: 0,
            ip: ip.to_string(),
            hostname: None,
            state: "up".into(),
            in_scope,
            first_seen_ms: 0,
            last_seen_ms: 0,
        }
    }

    fn rule(id: i64, def: &str) -> ScopeDefinition {
        ScopeDefinition { id, project_id: 1, definition: def.to_string(), created_ms: 0 }
    }

    #[test]
    fn fallback_puts_each_host_in_exactly_one_bucket() {
        let hosts = vec![
            host("10.0.1.20", true),
            host("10.0.0.5", true),
            host("10.0.1.3", true),
            host("192.168.0.1", true),
            host("10.0.0.6", false),
            host("fe80::1", true),
        ];
        let seg = resolve_segments(&[], &hosts);
        assert_eq!(seg.mode, SegmentMode::Fallback24);
        let keys: Vec<&str> = seg.segments.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["fallback:10.0.0.0/24", "fallback:10.0.1.0/24", "fallback:192.168.0.0/24"]);
        assert_eq!(seg.segments[1].hosts, vec!["10.0.1.3", "10.0.1.20"]);

        let total: usize = seg.segments.iter().map(|s| s.hosts.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn rules_overlap_and_unmapped_catches_rest() {
        let rules = vec![rule(1, "10.0.0.0/24"), rule(2, "10.0.0.5"), rule(3, "172.16.0.0/12")];
        let hosts = vec![host("10.0.0.5", true), host("10.0.0.9", true), host("10.0.2.3", true)];
        let seg = resolve_segments(&rules, &hosts);
        assert_eq!(seg.mode, SegmentMode::ScopeRules);
        assert_eq!(seg.get("scope:1").unwrap().hosts, vec!["10.0.0.5", "10.0.0.9"]);
        assert_eq!(seg.get("scope:2").unwrap().hosts, vec!["10.0.0.5"]);
        assert!(seg.get("scope:3").unwrap().hosts.is_empty());
        assert_eq!(seg.get(UNMAPPED_KEY).unwrap().hosts, vec!["10.0.2.3"]);
        assert_eq!(seg.get("scope:1").unwrap().label, "10.0.0.0/24");

        for h in &hosts {
            assert!(seg.segments.iter().any(|s| s.hosts.contains(&h.ip)), "{} in no segment", h.ip);
        }
    }

    #[test]
    fn no_unmapped_segment_when_everything_matches() {
        let seg = resolve_segments(&[rule(1, "10.0.0.0/8")], &[host("10.1.2.3", true)]);
        assert_eq!(seg.segments.len(), 1);
        assert!(seg.get(UNMAPPED_KEY).is_none());
    }

    #[test]
    fn load_segments_reads_current_state() {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        db.add_scope_definition(p, "10.0.0.0/24").unwrap();
        let imp = NewImport::new("a.xml")
            .host(NewHost::new("10.0.0.5"))
            .host(NewHost::new("10.0.2.3").in_scope(true))
            .host(NewHost::new("10.0.3.3"));
        db.record_import(p, &imp).unwrap();

        let seg = load_segments(&db, p).unwrap();
        assert_eq!(seg.segments.len(), 2);
        assert_eq!(seg.get(UNMAPPED_KEY).unwrap().hosts, vec!["10.0.2.3"]);

        assert_eq!(load_segments(&db, p + 1).unwrap_err().kind(), ErrorKind::NotFound);
    }
}

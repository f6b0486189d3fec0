//! Differences between any two imports of a project, computed from their
//! observation snapshots: hosts, open exposures, and service fingerprints.

use observation_store::{Db, Fingerprint, HostObservation, ImportId, PortObservation, ProjectId, Result};
use reconbook_core::compare_ips;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOptions {
    pub include_lists: bool,
    /// Cap applied to each detail list independently. `None` keeps everything.
    pub preview_size: Option<usize>,
}

/// An (ip, port, protocol) key in an open state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Exposure {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
}

impl Exposure {
    fn order(&self, other: &Self) -> Ordering {
        compare_ips(&self.ip, &other.ip)
            .then_with(|| self.port.cmp(&other.port))
            .then_with(|| self.protocol.cmp(&other.protocol))
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.ip, self.port, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintChange {
    #[serde(flatten)]
    pub exposure: Exposure,
    pub before: Fingerprint,
    pub after: Fingerprint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    pub net_new_hosts: usize,
    pub disappeared_hosts: usize,
    pub net_new_open_exposures: usize,
    pub disappeared_open_exposures: usize,
    pub changed_fingerprints: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeltaLists {
    pub net_new_hosts: Vec<String>,
    pub disappeared_hosts: Vec<String>,
    pub net_new_open_exposures: Vec<Exposure>,
    pub disappeared_open_exposures: Vec<Exposure>,
    pub changed_fingerprints: Vec<FingerprintChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDelta {
    pub base_import_id: ImportId,
    pub target_import_id: ImportId,
    pub summary: DeltaSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lists: Option<DeltaLists>,
}

/// What one import saw: its host set and its open exposures with fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSnapshot {
    pub hosts: HashSet<String>,
    pub open: HashMap<Exposure, Fingerprint>,
}

impl ImportSnapshot {
    pub fn from_observations(hosts: &[HostObservation], ports: &[PortObservation]) -> Self {
        let hosts = hosts.iter().map(|h| h.ip.clone()).collect();
        let open = ports
            .iter()
            .filter(|p| p.is_open())
            .map(|p| {
                let key = Exposure { ip: p.ip.clone(), port: p.port, protocol: p.protocol.clone() };
                (key, p.fingerprint.clone())
            })
            .collect();
        ImportSnapshot { hosts, open }
    }

    pub fn load(db: &Db, import_id: ImportId) -> Result<Self> {
        let hosts = db.import_host_observations(import_id)?;
        let ports = db.import_port_observations(import_id)?;
        Ok(Self::from_observations(&hosts, &ports))
    }
}

fn sorted_hosts<'a>(it: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut v: Vec<String> = it.cloned().collect();
    v.sort_by(|a, b| compare_ips(a, b));
    v
}

fn sorted_exposures<'a>(it: impl Iterator<Item = &'a Exposure>) -> Vec<Exposure> {
    let mut v: Vec<Exposure> = it.cloned().collect();
    v.sort_by(|a, b| a.order(b));
    v
}

/// Full (uncapped) differences from `base` to `target`.
pub fn diff_snapshots(base: &ImportSnapshot, target: &ImportSnapshot) -> DeltaLists {
    let net_new_hosts = sorted_hosts(target.hosts.difference(&base.hosts));
    let disappeared_hosts = sorted_hosts(base.hosts.difference(&target.hosts));
    let net_new_open_exposures = sorted_exposures(target.open.keys().filter(|k| !base.open.contains_key(*k)));
    let disappeared_open_exposures = sorted_exposures(base.open.keys().filter(|k| !target.open.contains_key(*k)));

    let mut changed_fingerprints: Vec<FingerprintChange> = base
        .open
        .iter()
        .filter_map(|(key, before)| {
            let after = target.open.get(key)?;
            (before != after).then(|| FingerprintChange { exposure: key.clone(), before: before.clone(), after: after.clone() })
        })
        .collect();
    changed_fingerprints.sort_by(|a, b| a.exposure.order(&b.exposure));

    DeltaLists { net_new_hosts, disappeared_hosts, net_new_open_exposures, disappeared_open_exposures, changed_fingerprints }
}

impl DeltaLists {
    pub fn summary(&self) -> DeltaSummary {
        DeltaSummary {
            net_new_hosts: self.net_new_hosts.len(),
            disappeared_hosts: self.disappeared_hosts.len(),
            net_new_open_exposures: self.net_new_open_exposures.len(),
            disappeared_open_exposures: self.disappeared_open_exposures.len(),
            changed_fingerprints: self.changed_fingerprints.len(),
        }
    }

    fn truncate(&mut self, n: usize) {
        self.net_new_hosts.truncate(n);
        self.disappeared_hosts.truncate(n);
        self.net_new_open_exposures.truncate(n);
        self.disappeared_open_exposures.truncate(n);
        self.changed_fingerprints.truncate(n);
    }
}

/// Compare two imports of one project. Both ids must exist and belong to the
/// project. Identical ids are accepted and yield an all-zero summary.
pub fn compute_import_delta(
    db: &Db,
    project_id: ProjectId,
    base_import_id: ImportId,
    target_import_id: ImportId,
    opts: DeltaOptions,
) -> Result<ImportDelta> {
    db.require_project(project_id)?;
    db.require_import(project_id, base_import_id)?;
    db.require_import(project_id, target_import_id)?;

    let base = ImportSnapshot::load(db, base_import_id)?;
    let target = ImportSnapshot::load(db, target_import_id)?;
    let mut lists = diff_snapshots(&base, &target);
    let summary = lists.summary();
    debug!(project_id, base_import_id, target_import_id, ?summary, "import delta computed");

    let lists = opts.include_lists.then(|| {
        if let Some(n) = opts.preview_size {
            lists.truncate(n);
        }
        lists
    });
    Ok(ImportDelta { base_import_id, target_import_id, summary, lists })
}

#[cfg(test)]
mod tests {
    use super::*;
    use observation_store::{ErrorKind, NewHost, NewImport, NewPort};
    use reconbook_core::PortState;

    fn all_lists() -> DeltaOptions {
        DeltaOptions { include_lists: true, preview_size: None }
    }

    fn exposure(ip: &str, port: u16) -> Exposure {
        Exposure { ip: ip.into(), port, protocol: "tcp".into() }
    }

    fn two_imports() -> (Db, ProjectId, ImportId, ImportId) {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let base = NewImport::new("base.xml")
            .host(NewHost::new("10.0.0.1").port(NewPort::open(22, "tcp").service("ssh").product("OpenSSH").version("8.9")))
            .host(NewHost::new("10.0.0.2").port(NewPort::open(80, "tcp").service("http")))
            .host(NewHost::new("10.0.0.4").port(NewPort::open(25, "tcp").service("smtp")));
        let target = NewImport::new("target.xml")
            .host(NewHost::new("10.0.0.1").port(NewPort::new(22, "tcp", PortState::Closed)))
            .host(NewHost::new("10.0.0.2").port(NewPort::open(80, "tcp").service("http").product("nginx")))
            .host(NewHost::new("10.0.0.3").port(NewPort::open(443, "tcp").service("https")));
        let b = db.record_import(p, &base).unwrap();
        let t = db.record_import(p, &target).unwrap();
        (db, p, b, t)
    }

    #[test]
    fn disappeared_and_new_exposures() {
        let (db, p, b, t) = two_imports();
        let d = compute_import_delta(&db, p, b, t, all_lists()).unwrap();
        let lists = d.lists.unwrap();
        assert_eq!(lists.disappeared_open_exposures, vec![exposure("10.0.0.1", 22), exposure("10.0.0.4", 25)]);
        assert_eq!(lists.net_new_open_exposures, vec![exposure("10.0.0.3", 443)]);
        assert_eq!(lists.net_new_hosts, vec!["10.0.0.3"]);
        assert_eq!(lists.disappeared_hosts, vec!["10.0.0.4"]);

        // 22/tcp closed in target: a disappearance, never a fingerprint change
        assert_eq!(lists.changed_fingerprints.len(), 1);
        let change = &lists.changed_fingerprints[0];
        assert_eq!(change.exposure, exposure("10.0.0.2", 80));
        assert_eq!(change.before.product, None);
        assert_eq!(change.after.product.as_deref(), Some("nginx"));
    }

    #[test]
    fn swapping_imports_swaps_sets_but_not_changes() {
        let (db, p, b, t) = two_imports();
        let fwd = compute_import_delta(&db, p, b, t, all_lists()).unwrap().lists.unwrap();
        let rev = compute_import_delta(&db, p, t, b, all_lists()).unwrap().lists.unwrap();
        assert_eq!(fwd.net_new_hosts, rev.disappeared_hosts);
        assert_eq!(fwd.disappeared_hosts, rev.net_new_hosts);
        assert_eq!(fwd.net_new_open_exposures, rev.disappeared_open_exposures);
        assert_eq!(fwd.disappeared_open_exposures, rev.net_new_open_exposures);
        let keys = |l: &DeltaLists| l.changed_fingerprints.iter().map(|c| c.exposure.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&fwd), keys(&rev));
        assert_eq!(fwd.changed_fingerprints[0].before, rev.changed_fingerprints[0].after);
    }

    #[test]
    fn self_comparison_is_all_zero() {
        let (db, p, b, _) = two_imports();
        let d = compute_import_delta(&db, p, b, b, DeltaOptions::default()).unwrap();
        assert_eq!(d.summary, DeltaSummary::default());
        assert!(d.lists.is_none());
    }

    #[test]
    fn empty_string_differs_from_missing() {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let a = db.record_import(p, &NewImport::new("a").host(NewHost::new("10.0.0.1").port(NewPort::open(8080, "tcp").service("http")))).unwrap();
        let b = db.record_import(p, &NewImport::new("b").host(NewHost::new("10.0.0.1")
            .port(NewPort::new(8080, "tcp", PortState::OpenFiltered).service("http").version("")))).unwrap();
        let d = compute_import_delta(&db, p, a, b, all_lists()).unwrap();
        assert_eq!(d.summary.changed_fingerprints, 1);
        assert_eq!(d.summary.net_new_open_exposures, 0);
        assert_eq!(d.lists.unwrap().changed_fingerprints[0].after.version.as_deref(), Some(""));
    }

    #[test]
    fn preview_caps_each_list_but_not_counts() {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let a = db.record_import(p, &NewImport::new("a")).unwrap();
        let mut imp = NewImport::new("b");
        for i in 1..=9 {
            imp = imp.host(NewHost::new(format!("10.0.0.{i}")).port(NewPort::open(80, "tcp")));
        }
        let b = db.record_import(p, &imp).unwrap();
        let d = compute_import_delta(&db, p, a, b, DeltaOptions { include_lists: true, preview_size: Some(3) }).unwrap();
        assert_eq!(d.summary.net_new_hosts, 9);
        assert_eq!(d.summary.net_new_open_exposures, 9);
        let lists = d.lists.unwrap();
        assert_eq!(lists.net_new_hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(lists.net_new_open_exposures.len(), 3);
    }

    #[test]
    fn foreign_or_missing_import_is_not_found() {
        let (db, p, b, _) = two_imports();
        let other = db.create_project("other").unwrap().id;
        let foreign = db.record_import(other, &NewImport::new("x")).unwrap();
        let err = compute_import_delta(&db, p, b, foreign, DeltaOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = compute_import_delta(&db, p, 9_999, b, DeltaOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn serialized_shape() {
        let (db, p, b, t) = two_imports();
        let d = compute_import_delta(&db, p, b, t, DeltaOptions { include_lists: true, preview_size: Some(1) }).unwrap();
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["summary"]["disappeared_open_exposures"], 2);
        assert_eq!(v["lists"]["changed_fingerprints"][0]["ip"], "10.0.0.2");
        assert_eq!(v["lists"]["changed_fingerprints"][0]["after"]["product"], "nginx");
    }
}

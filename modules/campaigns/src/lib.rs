//! Service campaign queues: currently open ports on in-scope hosts, matched
//! against a fixed catalog of service families and grouped per host.

mod catalog;

pub use catalog::{Campaign, Rule};

use observation_store::{CurrentPort, Db, Fingerprint, ImportId, ProjectId, Result};
use reconbook_core::{clamp_limit, compare_ips, WorkStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    pub work_status: WorkStatus,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub scanned: usize,
    pub flagged: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl StatusSummary {
    fn count(&mut self, status: WorkStatus) {
        match status {
            WorkStatus::Scanned => self.scanned += 1,
            WorkStatus::Flagged => self.flagged += 1,
            WorkStatus::InProgress => self.in_progress += 1,
            WorkStatus::Done => self.done += 1,
        }
    }
}

/// One host with every one of its ports that matched the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignHost {
    pub host_id: i64,
    pub ip: String,
    pub hostname: Option<String>,
    pub ports: Vec<CampaignPort>,
    pub status_summary: StatusSummary,
    pub latest_seen_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignQueue {
    pub campaign: Campaign,
    pub items: Vec<CampaignHost>,
    /// Distinct matching hosts, before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    /// Every import that ever observed any matching host.
    pub source_import_ids: Vec<ImportId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CampaignCount {
    pub campaign: Campaign,
    pub hosts: usize,
    pub ports: usize,
}

/// Group matching ports by host. Hosts come out in numeric IP order, ports by
/// (port, protocol).
pub fn group_matches(campaign: Campaign, ports: &[CurrentPort]) -> Vec<CampaignHost> {
    let mut by_host: HashMap<i64, CampaignHost> = HashMap::new();
    for p in ports.iter().filter(|p| campaign.matches(p.port, &p.protocol, p.fingerprint.service.as_deref())) {
        let host = by_host.entry(p.host_id).or_insert_with(|| CampaignHost {
            host_id: p.host_id,
            ip: p.ip.clone(),
            hostname: p.hostname.clone(),
            ports: Vec::new(),
            status_summary: StatusSummary::default(),
            latest_seen_ms: p.last_seen_ms,
        });
        host.status_summary.count(p.work_status);
        host.latest_seen_ms = host.latest_seen_ms.max(p.last_seen_ms);
        host.ports.push(CampaignPort {
            port: p.port,
            protocol: p.protocol.clone(),
            state: p.state.clone(),
            fingerprint: p.fingerprint.clone(),
            work_status: p.work_status,
            last_seen_ms: p.last_seen_ms,
        });
    }
    let mut hosts: Vec<CampaignHost> = by_host.into_values().collect();
    for h in &mut hosts {
        h.ports.sort_by(|a, b| a.port.cmp(&b.port).then_with(|| a.protocol.cmp(&b.protocol)));
    }
    hosts.sort_by(|a, b| compare_ips(&a.ip, &b.ip));
    hosts
}

/// One page of a campaign queue. `limit` defaults to 50 and is capped at 500.
pub fn list_service_campaign_queue(
    db: &Db,
    project_id: ProjectId,
    campaign: &str,
    limit: Option<usize>,
    offset: usize,
) -> Result<CampaignQueue> {
    let campaign: Campaign = campaign.parse()?;
    db.require_project(project_id)?;
    let limit = clamp_limit(limit);

    let ports = db.open_ports_on_in_scope_hosts(project_id)?;
    let hosts = group_matches(campaign, &ports);
    let ips: HashSet<&str> = hosts.iter().map(|h| h.ip.as_str()).collect();
    let source_import_ids = db.imports_observing(project_id, &ips)?;
    let total = hosts.len();
    let items: Vec<CampaignHost> = hosts.into_iter().skip(offset).take(limit).collect();
    debug!(project_id, %campaign, total, returned = items.len(), "campaign queue built");

    Ok(CampaignQueue { campaign, items, total, limit, offset, source_import_ids })
}

/// Matching host and port counts for every campaign, in catalog order.
pub fn campaign_overview(db: &Db, project_id: ProjectId) -> Result<Vec<CampaignCount>> {
    db.require_project(project_id)?;
    let ports = db.open_ports_on_in_scope_hosts(project_id)?;
    Ok(Campaign::ALL
        .into_iter()
        .map(|campaign| {
            let hosts = group_matches(campaign, &ports);
            CampaignCount { campaign, hosts: hosts.len(), ports: hosts.iter().map(|h| h.ports.len()).sum() }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use observation_store::{ErrorKind, NewHost, NewImport, NewPort};
    use reconbook_core::PortState;

    fn seeded() -> (Db, ProjectId, ImportId, ImportId) {
        let db = Db::open_in_memory().unwrap();
        let p = db.create_project("acme").unwrap().id;
        let first = NewImport::new("first.xml")
            .at(1_000)
            .host(NewHost::new("10.0.0.10").hostname("dc01")
                .port(NewPort::open(445, "tcp"))
                .port(NewPort::open(1139, "tcp").service("netbios-ssn"))
                .port(NewPort::open(10389, "tcp").service("ldap")))
            .host(NewHost::new("10.0.0.9").port(NewPort::new(139, "tcp", PortState::OpenFiltered)))
            .host(NewHost::new("10.0.0.200").in_scope(false).port(NewPort::open(445, "tcp").service("microsoft-ds")));
        let second = NewImport::new("second.xml")
            .at(2_000)
            .host(NewHost::new("10.0.0.10").port(NewPort::open(445, "tcp").service("microsoft-ds")))
            .host(NewHost::new("10.0.0.11").port(NewPort::new(445, "tcp", PortState::Closed)))
            .host(NewHost::new("10.0.1.1").port(NewPort::open(389, "tcp")));
        let a = db.record_import(p, &first).unwrap();
        let b = db.record_import(p, &second).unwrap();
        (db, p, a, b)
    }

    #[test]
    fn smb_merges_port_and_service_matches_per_host() {
        let (db, p, a, b) = seeded();
        let q = list_service_campaign_queue(&db, p, "smb", None, 0).unwrap();
        assert_eq!(q.total, 2);
        let ips: Vec<&str> = q.items.iter().map(|h| h.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.9", "10.0.0.10"]);

        let dc = &q.items[1];
        assert_eq!(dc.hostname.as_deref(), Some("dc01"));
        let ports: Vec<u16> = dc.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![445, 1139]);
        assert_eq!(dc.latest_seen_ms, 2_000);
        assert_eq!(dc.status_summary.scanned, 2);
        // 10.0.0.11 is closed and 10.0.0.200 out of scope
        assert_eq!(q.source_import_ids, vec![a, b]);
    }

    #[test]
    fn ldap_by_name_off_port_and_by_port_without_name() {
        let (db, p, a, b) = seeded();
        let q = list_service_campaign_queue(&db, p, "LDAP", None, 0).unwrap();
        let ips: Vec<&str> = q.items.iter().map(|h| h.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.10", "10.0.1.1"]);
        assert_eq!(q.items[0].ports[0].port, 10389);
        assert_eq!(q.items[1].ports[0].fingerprint.service, None);
        assert_eq!(q.source_import_ids, vec![a, b]);
    }

    #[test]
    fn pagination_is_over_hosts_and_audit_ids_ignore_the_window() {
        let (db, p, a, b) = seeded();
        let ping = db.record_import(p, &NewImport::new("ping.xml").at(3_000).host(NewHost::new("10.0.0.9"))).unwrap();
        let q = list_service_campaign_queue(&db, p, "smb", Some(1), 1).unwrap();
        assert_eq!(q.total, 2);
        assert_eq!(q.items.len(), 1);
        assert_eq!(q.items[0].ip, "10.0.0.10");
        assert_eq!(q.items[0].ports.len(), 2);
        // the ping sweep only saw 10.0.0.9, which is outside this page
        assert_eq!(q.source_import_ids, vec![a, b, ping]);

        let q = list_service_campaign_queue(&db, p, "smb", None, 10).unwrap();
        assert!(q.items.is_empty());
        assert_eq!(q.total, 2);
    }

    #[test]
    fn status_summary_tracks_work_status() {
        let (db, p, _, _) = seeded();
        db.set_port_work_status(p, "10.0.0.10", 445, "tcp", WorkStatus::InProgress).unwrap();
        db.set_port_work_status(p, "10.0.0.10", 1139, "tcp", WorkStatus::Done).unwrap();
        let q = list_service_campaign_queue(&db, p, "smb", None, 0).unwrap();
        let s = q.items[1].status_summary;
        assert_eq!((s.scanned, s.flagged, s.in_progress, s.done), (0, 0, 1, 1));
        assert_eq!(q.items[1].ports[0].work_status, WorkStatus::InProgress);
    }

    #[test]
    fn unknown_campaign_is_validation_error() {
        let (db, p, _, _) = seeded();
        let err = list_service_campaign_queue(&db, p, "telnet", None, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = list_service_campaign_queue(&db, 999, "smb", None, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn overview_counts_in_catalog_order() {
        let (db, p, _, _) = seeded();
        let counts = campaign_overview(&db, p).unwrap();
        assert_eq!(counts.len(), Campaign::ALL.len());
        assert_eq!(counts[0], CampaignCount { campaign: Campaign::Smb, hosts: 2, ports: 3 });
        assert_eq!(counts[1], CampaignCount { campaign: Campaign::Ldap, hosts: 2, ports: 2 });
        assert_eq!(counts[4].hosts, 0);
    }

    #[test]
    fn queue_json_shape() {
        let (db, p, _, _) = seeded();
        let q = list_service_campaign_queue(&db, p, "smb", None, 0).unwrap();
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["campaign"], "smb");
        assert_eq!(v["items"][1]["ports"][0]["service"], "microsoft-ds");
        assert_eq!(v["items"][1]["status_summary"]["scanned"], 2);
    }
}

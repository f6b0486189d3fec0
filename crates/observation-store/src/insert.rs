use crate::{
    now_ms, BaselineAddOutcome, BaselineId, Db, Error, ImportId, IntentTag, NewImport, Project, ProjectId,
    Result, ScopeDefinition, ScopeId,
};
use reconbook_core::{parse_ipv4, validate_confidence, Ipv4Target, ValidationError, WorkStatus};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::{debug, info};

impl Db {
    pub fn create_project(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName.into());
        }
        let created_ms = now_ms();
        self.conn.execute(
            "INSERT INTO projects(name, created_ms) VALUES (?,?)",
            params![name, created_ms],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(project_id = id, name, "project created");
        Ok(Project { id, name: name.to_string(), created_ms })
    }

    /// Drops the project and everything recorded under it.
    pub fn delete_project(&self, project_id: ProjectId) -> Result<()> {
        let n = self.conn.execute("DELETE FROM projects WHERE project_id=?", [project_id])?;
        if n == 0 {
            return Err(Error::not_found("project", project_id));
        }
        info!(project_id, "project deleted");
        Ok(())
    }

    /// Write one import atomically: the import row, its intent tags, every host
    /// and port observation, and the matching current-state upserts. Readers
    /// see all of it or none of it.
    pub fn record_import(&self, project_id: ProjectId, import: &NewImport) -> Result<ImportId> {
        self.require_project(project_id)?;
        validate_intents(&import.intents)?;
        validate_hosts(import)?;
        let rules = self.scope_targets(project_id)?;
        let at = import.imported_ms.unwrap_or_else(now_ms);
        let ports_found: usize = import.hosts.iter().map(|h| h.ports.len()).sum();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO scan_imports(project_id,filename,imported_ms,hosts_found,ports_found) VALUES (?,?,?,?,?)",
            params![project_id, import.filename, at, import.hosts.len() as i64, ports_found as i64],
        )?;
        let import_id = tx.last_insert_rowid();
        insert_intents(&tx, import_id, &import.intents)?;

        for host in &import.hosts {
            let ip = host.ip.trim();
            let in_scope = host.in_scope.unwrap_or_else(|| scope_match(&rules, ip));
            tx.execute(
                "INSERT INTO host_observations(import_id,project_id,ip,state,hostname,in_scope) VALUES (?,?,?,?,?,?)",
                params![import_id, project_id, ip, host.state, host.hostname, in_scope],
            )?;
            // an older import never overwrites newer current state
            tx.execute(
                "INSERT INTO hosts(project_id,ip,hostname,state,in_scope,first_seen_ms,last_seen_ms) VALUES (?,?,?,?,?,?,?)
                 ON CONFLICT(project_id,ip) DO UPDATE SET hostname=COALESCE(excluded.hostname,hosts.hostname), state=excluded.state, in_scope=excluded.in_scope, last_seen_ms=excluded.last_seen_ms
                 WHERE excluded.last_seen_ms >= hosts.last_seen_ms",
                params![project_id, ip, host.hostname, host.state, in_scope, at, at],
            )?;
            let host_id: i64 = tx.query_row(
                "SELECT host_id FROM hosts WHERE project_id=? AND ip=?",
                params![project_id, ip],
                |r| r.get(0),
            )?;

            for p in &host.ports {
                let protocol = normalize_protocol(&p.protocol)?;
                let fp = &p.fingerprint;
                tx.execute(
                    "INSERT INTO port_observations(import_id,project_id,ip,port,protocol,state,service,product,version,extra_info) VALUES (?,?,?,?,?,?,?,?,?,?)",
                    params![import_id, project_id, ip, p.port as i64, protocol, p.state.as_str(), fp.service, fp.product, fp.version, fp.extra_info],
                )?;
                tx.execute(
                    "INSERT INTO ports(host_id,port,protocol,state,service,product,version,extra_info,first_seen_ms,last_seen_ms) VALUES (?,?,?,?,?,?,?,?,?,?)
                     ON CONFLICT(host_id,port,protocol) DO UPDATE SET state=excluded.state, service=excluded.service, product=excluded.product, version=excluded.version, extra_info=excluded.extra_info, last_seen_ms=excluded.last_seen_ms
                     WHERE excluded.last_seen_ms >= ports.last_seen_ms",
                    params![host_id, p.port as i64, protocol, p.state.as_str(), fp.service, fp.product, fp.version, fp.extra_info, at, at],
                )?;
            }
        }
        tx.commit()?;
        info!(project_id, import_id, hosts = import.hosts.len(), ports = ports_found, "import recorded");
        Ok(import_id)
    }

    /// Replace the whole intent set of one import.
    pub fn set_import_intents(&self, project_id: ProjectId, import_id: ImportId, tags: &[IntentTag]) -> Result<()> {
        self.require_import(project_id, import_id)?;
        validate_intents(tags)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM scan_import_intents WHERE import_id=?", [import_id])?;
        insert_intents(&tx, import_id, tags)?;
        tx.commit()?;
        debug!(project_id, import_id, intents = tags.len(), "import intents replaced");
        Ok(())
    }

    pub fn add_scope_definition(&self, project_id: ProjectId, raw: &str) -> Result<ScopeDefinition> {
        self.add_scope_definitions(project_id, &[raw])?
            .pop()
            .ok_or_else(|| Error::not_found("scope definition", raw.trim()))
    }

    /// Parse every entry before inserting any; one bad entry rejects the batch.
    /// Current `in_scope` flags are refreshed once, after the commit.
    pub fn add_scope_definitions<S: AsRef<str>>(&self, project_id: ProjectId, definitions: &[S]) -> Result<Vec<ScopeDefinition>> {
        self.require_project(project_id)?;
        for raw in definitions {
            Ipv4Target::parse(raw.as_ref())?;
        }
        if definitions.is_empty() {
            return Ok(Vec::new());
        }
        let created_ms = now_ms();
        let tx = self.conn.unchecked_transaction()?;
        let mut added = Vec::with_capacity(definitions.len());
        for raw in definitions {
            let definition = raw.as_ref().trim().to_string();
            tx.execute(
                "INSERT INTO scope_definitions(project_id,definition,created_ms) VALUES (?,?,?)",
                params![project_id, definition, created_ms],
            )?;
            added.push(ScopeDefinition { id: tx.last_insert_rowid(), project_id, definition, created_ms });
        }
        tx.commit()?;
        let updated = self.refresh_scope_flags(project_id)?;
        info!(project_id, rules = added.len(), hosts_updated = updated, "scope rules added");
        Ok(added)
    }

    pub fn delete_scope_definition(&self, project_id: ProjectId, scope_id: ScopeId) -> Result<()> {
        let n = self.conn.execute(
            "DELETE FROM scope_definitions WHERE scope_id=? AND project_id=?",
            params![scope_id, project_id],
        )?;
        if n == 0 {
            return Err(Error::not_found("scope definition", scope_id));
        }
        let updated = self.refresh_scope_flags(project_id)?;
        info!(project_id, scope_id, hosts_updated = updated, "scope rule deleted");
        Ok(())
    }

    /// Recompute the current `in_scope` flag of every current host from the
    /// scope rules. Observations keep the flag they were recorded with.
    pub fn refresh_scope_flags(&self, project_id: ProjectId) -> Result<usize> {
        let rules = self.scope_targets(project_id)?;
        let hosts = self.current_hosts(project_id)?;
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        for h in hosts {
            let flag = scope_match(&rules, &h.ip);
            if flag != h.in_scope {
                tx.execute("UPDATE hosts SET in_scope=? WHERE host_id=?", params![flag, h.id])?;
                changed += 1;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Validate every entry first; store the canonical forms, skipping ones already present.
    pub fn add_baseline_definitions<S: AsRef<str>>(&self, project_id: ProjectId, definitions: &[S]) -> Result<BaselineAddOutcome> {
        self.require_project(project_id)?;
        let targets = definitions
            .iter()
            .map(|d| Ipv4Target::parse_baseline(d.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let created_ms = now_ms();
        let tx = self.conn.unchecked_transaction()?;
        let mut outcome = BaselineAddOutcome::default();
        for t in &targets {
            let n = tx.execute(
                "INSERT OR IGNORE INTO expected_asset_baselines(project_id,definition,created_ms) VALUES (?,?,?)",
                params![project_id, t.to_string(), created_ms],
            )?;
            if n == 1 { outcome.added += 1; } else { outcome.already_present += 1; }
        }
        tx.commit()?;
        info!(project_id, added = outcome.added, already_present = outcome.already_present, "baseline definitions added");
        Ok(outcome)
    }

    pub fn delete_baseline_definition(&self, project_id: ProjectId, baseline_id: BaselineId) -> Result<()> {
        let n = self.conn.execute(
            "DELETE FROM expected_asset_baselines WHERE baseline_id=? AND project_id=?",
            params![baseline_id, project_id],
        )?;
        if n == 0 {
            return Err(Error::not_found("baseline definition", baseline_id));
        }
        Ok(())
    }

    pub fn set_port_work_status(&self, project_id: ProjectId, ip: &str, port: u16, protocol: &str, status: WorkStatus) -> Result<()> {
        let protocol = normalize_protocol(protocol)?;
        let n = self.conn.execute(
            "UPDATE ports SET work_status=? WHERE port=? AND protocol=? AND host_id=(SELECT host_id FROM hosts WHERE project_id=? AND ip=?)",
            params![status.as_str(), port as i64, protocol, project_id, ip.trim()],
        )?;
        if n == 0 {
            return Err(Error::not_found("port", format!("{}:{}/{}", ip.trim(), port, protocol)));
        }
        Ok(())
    }

    pub fn set_host_in_scope(&self, project_id: ProjectId, ip: &str, in_scope: bool) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE hosts SET in_scope=? WHERE project_id=? AND ip=?",
            params![in_scope, project_id, ip.trim()],
        )?;
        if n == 0 {
            return Err(Error::not_found("host", ip.trim()));
        }
        Ok(())
    }
}

fn insert_intents(conn: &Connection, import_id: ImportId, tags: &[IntentTag]) -> Result<()> {
    for t in tags {
        conn.execute(
            "INSERT INTO scan_import_intents(import_id,intent,source,confidence) VALUES (?,?,?,?)",
            params![import_id, t.intent.as_str(), t.source.as_str(), t.confidence],
        )?;
    }
    Ok(())
}

/// No rules means everything is in scope. Non-IPv4 hosts never match a rule.
pub(crate) fn scope_match(rules: &[Ipv4Target], ip: &str) -> bool {
    if rules.is_empty() {
        return true;
    }
    match parse_ipv4(ip) {
        Some(addr) => rules.iter().any(|r| r.contains(addr)),
        None => false,
    }
}

fn normalize_protocol(p: &str) -> Result<String> {
    let t = p.trim().to_ascii_lowercase();
    match t.as_str() {
        "tcp" | "udp" | "sctp" => Ok(t),
        _ => Err(ValidationError::UnsupportedProtocol(p.to_string()).into()),
    }
}

fn validate_intents(tags: &[IntentTag]) -> Result<()> {
    let mut seen = HashSet::new();
    for t in tags {
        validate_confidence(t.confidence)?;
        if !seen.insert(t.intent) {
            return Err(ValidationError::DuplicateIntent(t.intent).into());
        }
    }
    Ok(())
}

fn validate_hosts(import: &NewImport) -> Result<()> {
    let mut ips = HashSet::new();
    for h in &import.hosts {
        let ip = h.ip.trim();
        if ip.is_empty() {
            return Err(ValidationError::InvalidAddress(h.ip.clone()).into());
        }
        if !ips.insert(ip) {
            return Err(ValidationError::DuplicateHost(ip.to_string()).into());
        }
        let mut keys = HashSet::new();
        for p in &h.ports {
            let protocol = normalize_protocol(&p.protocol)?;
            if !keys.insert((p.port, protocol.clone())) {
                return Err(ValidationError::DuplicatePort { ip: ip.to_string(), port: p.port, protocol }.into());
            }
        }
    }
    Ok(())
}

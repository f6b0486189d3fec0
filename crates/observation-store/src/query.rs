use crate::{
    BaselineDefinition, CurrentHost, CurrentPort, Db, Error, Fingerprint, HostObservation, ImportId, IntentTag,
    PortObservation, Project, ProjectId, Result, ScanImport, ScopeDefinition,
};
use reconbook_core::{Ipv4Target, ScanIntent, ValidationError};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use tracing::warn;

fn parse_col<T: FromStr<Err = ValidationError>>(r: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn project_from_row(r: &Row) -> rusqlite::Result<Project> {
    Ok(Project { id: r.get(0)?, name: r.get(1)?, created_ms: r.get(2)? })
}

fn host_from_row(r: &Row) -> rusqlite::Result<CurrentHost> {
    Ok(CurrentHost {
        id: r.get(0)?,
        ip: r.get(1)?,
        hostname: r.get(2)?,
        state: r.get(3)?,
        in_scope: r.get(4)?,
        first_seen_ms: r.get(5)?,
        last_seen_ms: r.get(6)?,
    })
}

fn fingerprint_from_row(r: &Row, start: usize) -> rusqlite::Result<Fingerprint> {
    Ok(Fingerprint {
        service: r.get(start)?,
        product: r.get(start + 1)?,
        version: r.get(start + 2)?,
        extra_info: r.get(start + 3)?,
    })
}

const IMPORT_COLS: &str = "import_id, project_id, filename, imported_ms, hosts_found, ports_found";
const HOST_COLS: &str = "host_id, ip, hostname, state, in_scope, first_seen_ms, last_seen_ms";

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        Ok(self
            .conn
            .query_row(
                "SELECT project_id, name, created_ms FROM projects WHERE project_id=?",
                [project_id],
                project_from_row,
            )
            .optional()?)
    }

    pub fn require_project(&self, project_id: ProjectId) -> Result<Project> {
        self.project(project_id)?.ok_or_else(|| Error::not_found("project", project_id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare("SELECT project_id, name, created_ms FROM projects ORDER BY project_id")?;
        let rows = stmt.query_map([], project_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `None` when the import does not exist or belongs to another project.
    pub fn find_import(&self, project_id: ProjectId, import_id: ImportId) -> Result<Option<ScanImport>> {
        let sql = format!("SELECT {IMPORT_COLS} FROM scan_imports WHERE import_id=? AND project_id=?");
        let row = self
            .conn
            .query_row(&sql, params![import_id, project_id], import_from_row)
            .optional()?;
        match row {
            Some(mut imp) => {
                imp.intents = self.import_intents(imp.id)?;
                Ok(Some(imp))
            }
            None => Ok(None),
        }
    }

    pub fn require_import(&self, project_id: ProjectId, import_id: ImportId) -> Result<ScanImport> {
        self.find_import(project_id, import_id)?.ok_or_else(|| Error::not_found("import", import_id))
    }

    /// Newest first.
    pub fn list_imports(&self, project_id: ProjectId) -> Result<Vec<ScanImport>> {
        let sql = format!("SELECT {IMPORT_COLS} FROM scan_imports WHERE project_id=? ORDER BY imported_ms DESC, import_id DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut imports = stmt.query_map([project_id], import_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        for imp in &mut imports {
            imp.intents = self.import_intents(imp.id)?;
        }
        Ok(imports)
    }

    /// Intent tags of one import, in intent display order.
    pub fn import_intents(&self, import_id: ImportId) -> Result<Vec<IntentTag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT intent, source, confidence FROM scan_import_intents WHERE import_id=?")?;
        let mut tags = stmt
            .query_map([import_id], |r| {
                Ok(IntentTag { intent: parse_col(r, 0)?, source: parse_col(r, 1)?, confidence: r.get(2)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tags.sort_by_key(|t| t.intent);
        Ok(tags)
    }

    pub fn scope_definitions(&self, project_id: ProjectId) -> Result<Vec<ScopeDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT scope_id, project_id, definition, created_ms FROM scope_definitions WHERE project_id=? ORDER BY scope_id",
        )?;
        let rows = stmt
            .query_map([project_id], |r| {
                Ok(ScopeDefinition { id: r.get(0)?, project_id: r.get(1)?, definition: r.get(2)?, created_ms: r.get(3)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub(crate) fn scope_targets(&self, project_id: ProjectId) -> Result<Vec<Ipv4Target>> {
        let mut targets = Vec::new();
        for def in self.scope_definitions(project_id)? {
            match def.target() {
                Some(t) => targets.push(t),
                None => warn!(project_id, scope_id = def.id, definition = %def.definition, "unparseable scope rule ignored"),
            }
        }
        Ok(targets)
    }

    pub fn baseline_definitions(&self, project_id: ProjectId) -> Result<Vec<BaselineDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT baseline_id, project_id, definition, created_ms FROM expected_asset_baselines WHERE project_id=? ORDER BY baseline_id",
        )?;
        let rows = stmt
            .query_map([project_id], |r| {
                Ok(BaselineDefinition { id: r.get(0)?, project_id: r.get(1)?, definition: r.get(2)?, created_ms: r.get(3)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every host in the current-state projection.
    pub fn current_hosts(&self, project_id: ProjectId) -> Result<Vec<CurrentHost>> {
        let sql = format!("SELECT {HOST_COLS} FROM hosts WHERE project_id=? ORDER BY host_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], host_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Current hosts whose current `in_scope` flag is set.
    pub fn in_scope_hosts(&self, project_id: ProjectId) -> Result<Vec<CurrentHost>> {
        let sql = format!("SELECT {HOST_COLS} FROM hosts WHERE project_id=? AND in_scope=1 ORDER BY host_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], host_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// For each intent, the IPs observed by at least one import tagged with it,
    /// anywhere in the project's history.
    pub fn covered_ips_by_intent(&self, project_id: ProjectId) -> Result<HashMap<ScanIntent, HashSet<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT i.intent, h.ip FROM host_observations h
             JOIN scan_import_intents i ON i.import_id = h.import_id
             WHERE h.project_id=?",
        )?;
        let rows = stmt
            .query_map([project_id], |r| Ok((parse_col::<ScanIntent>(r, 0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut covered: HashMap<ScanIntent, HashSet<String>> = HashMap::new();
        for (intent, ip) in rows {
            covered.entry(intent).or_default().insert(ip);
        }
        Ok(covered)
    }

    pub fn import_host_observations(&self, import_id: ImportId) -> Result<Vec<HostObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT import_id, ip, state, hostname, in_scope FROM host_observations WHERE import_id=? ORDER BY observation_id",
        )?;
        let rows = stmt
            .query_map([import_id], |r| {
                Ok(HostObservation { import_id: r.get(0)?, ip: r.get(1)?, state: r.get(2)?, hostname: r.get(3)?, in_scope: r.get(4)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn import_port_observations(&self, import_id: ImportId) -> Result<Vec<PortObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT import_id, ip, port, protocol, state, service, product, version, extra_info
             FROM port_observations WHERE import_id=? ORDER BY observation_id",
        )?;
        let rows = stmt
            .query_map([import_id], |r| {
                Ok(PortObservation {
                    import_id: r.get(0)?,
                    ip: r.get(1)?,
                    port: r.get(2)?,
                    protocol: r.get(3)?,
                    state: r.get(4)?,
                    fingerprint: fingerprint_from_row(r, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Currently open (`open`, `open|filtered`) ports on currently in-scope hosts.
    pub fn open_ports_on_in_scope_hosts(&self, project_id: ProjectId) -> Result<Vec<CurrentPort>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.host_id, h.ip, h.hostname, p.port, p.protocol, p.state, p.service, p.product, p.version, p.extra_info, p.work_status, p.last_seen_ms
             FROM ports p JOIN hosts h ON h.host_id = p.host_id
             WHERE h.project_id=? AND h.in_scope=1 AND p.state IN ('open','open|filtered')",
        )?;
        let rows = stmt
            .query_map([project_id], |r| {
                Ok(CurrentPort {
                    host_id: r.get(0)?,
                    ip: r.get(1)?,
                    hostname: r.get(2)?,
                    port: r.get(3)?,
                    protocol: r.get(4)?,
                    state: r.get(5)?,
                    fingerprint: fingerprint_from_row(r, 6)?,
                    work_status: parse_col(r, 10)?,
                    last_seen_ms: r.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sorted, deduplicated ids of every import that observed any of `ips`.
    pub fn imports_observing(&self, project_id: ProjectId, ips: &HashSet<&str>) -> Result<Vec<ImportId>> {
        if ips.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ip, import_id FROM host_observations WHERE project_id=?")?;
        let rows = stmt
            .query_map([project_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, ImportId>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let ids: BTreeSet<ImportId> = rows
            .into_iter()
            .filter(|(ip, _)| ips.contains(ip.as_str()))
            .map(|(_, id)| id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

fn import_from_row(r: &Row) -> rusqlite::Result<ScanImport> {
    Ok(ScanImport {
        id: r.get(0)?,
        project_id: r.get(1)?,
        filename: r.get(2)?,
        imported_ms: r.get(3)?,
        hosts_found: r.get(4)?,
        ports_found: r.get(5)?,
        intents: Vec::new(),
    })
}

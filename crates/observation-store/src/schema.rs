pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE projects (
  project_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE,
  created_ms      INTEGER NOT NULL
);

-- observation log: written once per import, never updated

CREATE TABLE scan_imports (
  import_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  filename        TEXT NOT NULL,
  imported_ms     INTEGER NOT NULL,
  hosts_found     INTEGER NOT NULL DEFAULT 0,
  ports_found     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE scan_import_intents (
  intent_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  import_id       INTEGER NOT NULL REFERENCES scan_imports(import_id) ON DELETE CASCADE,
  intent          TEXT NOT NULL CHECK (intent IN ('ping_sweep','top_1k_tcp','all_tcp','top_udp','vuln_nse')),
  source          TEXT NOT NULL CHECK (source IN ('manual','auto')),
  confidence      REAL NOT NULL CHECK (confidence BETWEEN 0.0 AND 1.0),
  UNIQUE (import_id, intent)
);

CREATE TABLE host_observations (
  observation_id  INTEGER PRIMARY KEY AUTOINCREMENT,
  import_id       INTEGER NOT NULL REFERENCES scan_imports(import_id) ON DELETE CASCADE,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  ip              TEXT NOT NULL,
  state           TEXT NOT NULL,
  hostname        TEXT,
  in_scope        INTEGER NOT NULL CHECK (in_scope IN (0,1)),
  UNIQUE (import_id, ip)
);

CREATE TABLE port_observations (
  observation_id  INTEGER PRIMARY KEY AUTOINCREMENT,
  import_id       INTEGER NOT NULL REFERENCES scan_imports(import_id) ON DELETE CASCADE,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  ip              TEXT NOT NULL,
  port            INTEGER NOT NULL CHECK (port BETWEEN 0 AND 65535),
  protocol        TEXT NOT NULL CHECK (protocol IN ('tcp','udp','sctp')),
  state           TEXT NOT NULL,
  service         TEXT,
  product         TEXT,
  version         TEXT,
  extra_info      TEXT,
  UNIQUE (import_id, ip, port, protocol)
);

-- user-managed definitions

CREATE TABLE scope_definitions (
  scope_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  definition      TEXT NOT NULL,
  created_ms      INTEGER NOT NULL
);

CREATE TABLE expected_asset_baselines (
  baseline_id     INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  definition      TEXT NOT NULL,
  created_ms      INTEGER NOT NULL,
  UNIQUE (project_id, definition)
);

-- current-state projection: latest known, mutable

CREATE TABLE hosts (
  host_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id      INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
  ip              TEXT NOT NULL,
  hostname        TEXT,
  state           TEXT NOT NULL,
  in_scope        INTEGER NOT NULL CHECK (in_scope IN (0,1)),
  first_seen_ms   INTEGER NOT NULL,
  last_seen_ms    INTEGER NOT NULL,
  UNIQUE (project_id, ip)
);

CREATE TABLE ports (
  port_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  host_id         INTEGER NOT NULL REFERENCES hosts(host_id) ON DELETE CASCADE,
  port            INTEGER NOT NULL CHECK (port BETWEEN 0 AND 65535),
  protocol        TEXT NOT NULL CHECK (protocol IN ('tcp','udp','sctp')),
  state           TEXT NOT NULL,
  service         TEXT,
  product         TEXT,
  version         TEXT,
  extra_info      TEXT,
  work_status     TEXT NOT NULL DEFAULT 'scanned' CHECK (work_status IN ('scanned','flagged','in_progress','done')),
  first_seen_ms   INTEGER NOT NULL,
  last_seen_ms    INTEGER NOT NULL,
  UNIQUE (host_id, port, protocol)
);

CREATE INDEX idx_imports_project ON scan_imports(project_id);
CREATE INDEX idx_intents_import ON scan_import_intents(import_id);
CREATE INDEX idx_host_obs_project_ip ON host_observations(project_id, ip);
CREATE INDEX idx_port_obs_import ON port_observations(import_id);
CREATE INDEX idx_scope_project ON scope_definitions(project_id);
CREATE INDEX idx_hosts_scope ON hosts(project_id, in_scope);
CREATE INDEX idx_ports_lookup ON ports(protocol, port, state);

COMMIT;
"#
;

use reconbook_core::{IntentSource, Ipv4Target, PortState, ScanIntent, WorkStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type ProjectId = i64;
pub type ImportId = i64;
pub type ScopeId = i64;
pub type BaselineId = i64;
pub type HostId = i64;

pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_ms: i64,
}

/// One ingestion event, with the intent tags currently attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanImport {
    pub id: ImportId,
    pub project_id: ProjectId,
    pub filename: String,
    pub imported_ms: i64,
    pub hosts_found: i64,
    pub ports_found: i64,
    pub intents: Vec<IntentTag>,
}

fn full_confidence() -> f64 { 1.0 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentTag {
    pub intent: ScanIntent,
    #[serde(default)]
    pub source: IntentSource,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

impl IntentTag {
    pub fn manual(intent: ScanIntent) -> Self {
        IntentTag { intent, source: IntentSource::Manual, confidence: 1.0 }
    }

    pub fn auto(intent: ScanIntent, confidence: f64) -> Self {
        IntentTag { intent, source: IntentSource::Auto, confidence }
    }
}

/// Service fingerprint compared by the delta engine. `None` and `Some("")` differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub service: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostObservation {
    pub import_id: ImportId,
    pub ip: String,
    pub state: String,
    pub hostname: Option<String>,
    pub in_scope: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortObservation {
    pub import_id: ImportId,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub fingerprint: Fingerprint,
}

impl PortObservation {
    pub fn is_open(&self) -> bool {
        PortState::is_open_str(&self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeDefinition {
    pub id: ScopeId,
    pub project_id: ProjectId,
    pub definition: String,
    pub created_ms: i64,
}

impl ScopeDefinition {
    /// `None` when the stored text no longer parses.
    pub fn target(&self) -> Option<Ipv4Target> {
        Ipv4Target::parse(&self.definition).ok()
    }
}

/// Expected asset, stored in canonical (masked) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineDefinition {
    pub id: BaselineId,
    pub project_id: ProjectId,
    pub definition: String,
    pub created_ms: i64,
}

impl BaselineDefinition {
    pub fn target(&self) -> Option<Ipv4Target> {
        Ipv4Target::parse_baseline(&self.definition).ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaselineAddOutcome {
    pub added: usize,
    pub already_present: usize,
}

/// Latest-known projection of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentHost {
    pub id: HostId,
    pub ip: String,
    pub hostname: Option<String>,
    pub state: String,
    pub in_scope: bool,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}

/// Latest-known projection of a port, joined with its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentPort {
    pub host_id: HostId,
    pub ip: String,
    pub hostname: Option<String>,
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub fingerprint: Fingerprint,
    pub work_status: WorkStatus,
    pub last_seen_ms: i64,
}

fn default_host_state() -> String { "up".to_string() }
fn default_protocol() -> String { "tcp".to_string() }

/// Everything one import contributes, as handed over by the import pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewImport {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub imported_ms: Option<i64>,
    #[serde(default)]
    pub intents: Vec<IntentTag>,
    #[serde(default)]
    pub hosts: Vec<NewHost>,
}

impl NewImport {
    pub fn new(filename: impl Into<String>) -> Self {
        NewImport { filename: filename.into(), ..Default::default() }
    }

    pub fn at(mut self, imported_ms: i64) -> Self {
        self.imported_ms = Some(imported_ms);
        self
    }

    pub fn intent(mut self, intent: ScanIntent) -> Self {
        self.intents.push(IntentTag::manual(intent));
        self
    }

    pub fn host(mut self, host: NewHost) -> Self {
        self.hosts.push(host);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHost {
    pub ip: String,
    #[serde(default = "default_host_state")]
    pub state: String,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Computed from the project's scope rules when absent.
    #[serde(default)]
    pub in_scope: Option<bool>,
    #[serde(default)]
    pub ports: Vec<NewPort>,
}

impl NewHost {
    pub fn new(ip: impl Into<String>) -> Self {
        NewHost { ip: ip.into(), state: default_host_state(), hostname: None, in_scope: None, ports: Vec::new() }
    }

    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.hostname = Some(name.into());
        self
    }

    pub fn in_scope(mut self, in_scope: bool) -> Self {
        self.in_scope = Some(in_scope);
        self
    }

    pub fn port(mut self, port: NewPort) -> Self {
        self.ports.push(port);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPort {
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub state: PortState,
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
}

impl NewPort {
    pub fn new(port: u16, protocol: &str, state: PortState) -> Self {
        NewPort { port, protocol: protocol.to_string(), state, fingerprint: Fingerprint::default() }
    }

    pub fn open(port: u16, protocol: &str) -> Self {
        Self::new(port, protocol, PortState::Open)
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.fingerprint.service = Some(service.into());
        self
    }

    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.fingerprint.product = Some(product.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.fingerprint.version = Some(version.into());
        self
    }

    pub fn extra_info(mut self, extra: impl Into<String>) -> Self {
        self.fingerprint.extra_info = Some(extra.into());
        self
    }
}

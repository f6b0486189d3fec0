use thiserror::Error;

use crate::ScanIntent;

/// Caller-fixable input problems. Never retried; surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown scan intent: {0:?}")]
    UnknownIntent(String),
    #[error("unknown intent source: {0:?} (expected manual or auto)")]
    UnknownIntentSource(String),
    #[error("confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),
    #[error("unsupported campaign: {0:?}")]
    UnknownCampaign(String),
    #[error("unknown work status: {0:?}")]
    UnknownWorkStatus(String),
    #[error("unknown port state: {0:?}")]
    UnknownPortState(String),
    #[error("not an IPv4 address or CIDR: {0:?}")]
    InvalidAddress(String),
    #[error("IPv6 is not supported: {0:?}")]
    Ipv6NotSupported(String),
    #[error("prefix /{prefix} of {definition:?} is wider than /{min}")]
    PrefixTooWide { definition: String, prefix: u8, min: u8 },
    #[error("page must be >= 1")]
    InvalidPage,
    #[error("project name is empty")]
    EmptyProjectName,
    #[error("unsupported protocol: {0:?} (expected tcp, udp or sctp)")]
    UnsupportedProtocol(String),
    #[error("intent {0} given twice")]
    DuplicateIntent(ScanIntent),
    #[error("host {0} appears twice in one import")]
    DuplicateHost(String),
    #[error("port {ip}:{port}/{protocol} appears twice in one import")]
    DuplicatePort { ip: String, port: u16, protocol: String },
    #[error("no definitions given")]
    NoDefinitions,
    #[error("base and target are the same import ({0})")]
    SameImport(i64),
}

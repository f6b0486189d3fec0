//! Core types shared by the observation store and the analytics modules.
//!
//! Nothing in here touches storage: the closed enums that tag imports and
//! ports, the IPv4 math every analytics pass relies on, and the validation
//! errors raised at ingress.

pub mod error;
pub mod intent;
pub mod ipv4;
pub mod paging;
pub mod segment;
pub mod state;

pub use error::ValidationError;
pub use intent::{IntentSource, ScanIntent, validate_confidence};
pub use ipv4::{compare_ips, parse_ipv4, slash24_key, Ipv4Target};
pub use paging::{clamp_limit, clamp_preview, Page};
pub use segment::SegmentMode;
pub use state::{PortState, WorkStatus};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Port state as reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "open|filtered")]
    OpenFiltered,
    #[serde(rename = "closed|filtered")]
    ClosedFiltered,
    #[serde(rename = "unfiltered")]
    Unfiltered,
}

impl PortState {
    const ALL: [PortState; 6] = [
        PortState::Open,
        PortState::Closed,
        PortState::Filtered,
        PortState::OpenFiltered,
        PortState::ClosedFiltered,
        PortState::Unfiltered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
            PortState::OpenFiltered => "open|filtered",
            PortState::ClosedFiltered => "closed|filtered",
            PortState::Unfiltered => "unfiltered",
        }
    }

    /// `open` and `open|filtered` count as exposed.
    pub fn is_open(self) -> bool {
        matches!(self, PortState::Open | PortState::OpenFiltered)
    }

    /// Same test against a stored state string.
    pub fn is_open_str(s: &str) -> bool {
        s.parse::<PortState>().map(PortState::is_open).unwrap_or(false)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PortState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        PortState::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| ValidationError::UnknownPortState(s.to_string()))
    }
}

/// Operator triage state of a current port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Scanned,
    Flagged,
    InProgress,
    Done,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Scanned => "scanned",
            WorkStatus::Flagged => "flagged",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Done => "done",
        }
    }
}

impl FromStr for WorkStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scanned" => Ok(WorkStatus::Scanned),
            "flagged" => Ok(WorkStatus::Flagged),
            "in_progress" => Ok(WorkStatus::InProgress),
            "done" => Ok(WorkStatus::Done),
            _ => Err(ValidationError::UnknownWorkStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_states() {
        assert!(PortState::is_open_str("open"));
        assert!(PortState::is_open_str("open|filtered"));
        assert!(!PortState::is_open_str("filtered"));
        assert!(!PortState::is_open_str("closed|filtered"));
        assert!(!PortState::is_open_str("bogus"));
    }

    #[test]
    fn work_status_round_trip_names() {
        assert_eq!("in_progress".parse::<WorkStatus>().unwrap(), WorkStatus::InProgress);
        assert_eq!(WorkStatus::InProgress.as_str(), "in_progress");
        assert!("started".parse::<WorkStatus>().is_err());
    }
}

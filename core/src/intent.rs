use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Kind of scan that produced an import. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScanIntent {
    #[serde(rename = "ping_sweep")]
    PingSweep,
    #[serde(rename = "top_1k_tcp")]
    Top1kTcp,
    #[serde(rename = "all_tcp")]
    AllTcp,
    #[serde(rename = "top_udp")]
    TopUdp,
    #[serde(rename = "vuln_nse")]
    VulnNse,
}

impl ScanIntent {
    pub const ALL: [ScanIntent; 5] = [
        ScanIntent::PingSweep,
        ScanIntent::Top1kTcp,
        ScanIntent::AllTcp,
        ScanIntent::TopUdp,
        ScanIntent::VulnNse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScanIntent::PingSweep => "ping_sweep",
            ScanIntent::Top1kTcp => "top_1k_tcp",
            ScanIntent::AllTcp => "all_tcp",
            ScanIntent::TopUdp => "top_udp",
            ScanIntent::VulnNse => "vuln_nse",
        }
    }
}

impl fmt::Display for ScanIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanIntent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        ScanIntent::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| ValidationError::UnknownIntent(s.to_string()))
    }
}

/// Who attached an intent tag to an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    #[default]
    Manual,
    Auto,
}

impl IntentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentSource::Manual => "manual",
            IntentSource::Auto => "auto",
        }
    }
}

impl FromStr for IntentSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(IntentSource::Manual),
            "auto" => Ok(IntentSource::Auto),
            _ => Err(ValidationError::UnknownIntentSource(s.to_string())),
        }
    }
}

pub fn validate_confidence(c: f64) -> Result<f64, ValidationError> {
    if c.is_finite() && (0.0..=1.0).contains(&c) { Ok(c) } else { Err(ValidationError::InvalidConfidence(c)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_intents_in_display_order() {
        let names: Vec<&str> = ScanIntent::ALL.iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["ping_sweep", "top_1k_tcp", "all_tcp", "top_udp", "vuln_nse"]);
        for i in ScanIntent::ALL {
            assert_eq!(i.as_str().parse::<ScanIntent>().unwrap(), i);
        }
        assert!(ScanIntent::PingSweep < ScanIntent::VulnNse);
    }

    #[test]
    fn reject_unknown_intent() {
        let err = "top_2k_tcp".parse::<ScanIntent>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownIntent("top_2k_tcp".into()));
        assert!("".parse::<ScanIntent>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let s = serde_json::to_string(&ScanIntent::Top1kTcp).unwrap();
        assert_eq!(s, "\"top_1k_tcp\"");
        let back: ScanIntent = serde_json::from_str("\"vuln_nse\"").unwrap();
        assert_eq!(back, ScanIntent::VulnNse);
    }

    #[test]
    fn confidence_bounds() {
        assert!(validate_confidence(0.0).is_ok());
        assert!(validate_confidence(1.0).is_ok());
        assert!(validate_confidence(1.01).is_err());
        assert!(validate_confidence(f64::NAN).is_err());
    }
}

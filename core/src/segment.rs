use serde::Serialize;
use std::fmt;

/// How hosts were grouped: by the project's scope rules, or by `/24` when
/// it has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentMode {
    #[serde(rename = "scope_rules")]
    ScopeRules,
    #[serde(rename = "fallback_24")]
    Fallback24,
}

impl SegmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentMode::ScopeRules => "scope_rules",
            SegmentMode::Fallback24 => "fallback_24",
        }
    }
}

impl fmt::Display for SegmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_matches_display() {
        for mode in [SegmentMode::ScopeRules, SegmentMode::Fallback24] {
            assert_eq!(serde_json::to_value(mode).unwrap(), serde_json::json!(mode.to_string()));
        }
        assert_eq!(SegmentMode::Fallback24.as_str(), "fallback_24");
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "reconbook.yaml";
pub const DEFAULT_DATABASE: &str = "reconbook.db";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CoverageConfig {
    pub preview_size: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DeltaConfig {
    pub preview_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CampaignsConfig {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub coverage: Option<CoverageConfig>,
    pub delta: Option<DeltaConfig>,
    pub campaigns: Option<CampaignsConfig>,
}

impl Config {
    pub fn parse(yaml: &str) -> Result<Self> {
        // an empty file is a valid, empty config
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// `--db` wins over the config file, which wins over the built-in default.
    pub fn database(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.database.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    pub fn coverage_preview(&self) -> Option<usize> {
        self.coverage.as_ref().and_then(|c| c.preview_size)
    }

    pub fn coverage_page_size(&self) -> Option<usize> {
        self.coverage.as_ref().and_then(|c| c.page_size)
    }

    pub fn delta_preview(&self) -> Option<usize> {
        self.delta.as_ref().and_then(|d| d.preview_size)
    }

    pub fn campaign_limit(&self) -> Option<usize> {
        self.campaigns.as_ref().and_then(|c| c.limit)
    }
}

/// An explicit path must exist. Without one, `./reconbook.yaml` is read if present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    Config::parse(&s).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_all_sections() {
        let cfg = Config::parse(
            "database: /tmp/acme.db\ncoverage:\n  preview_size: 10\n  page_size: 25\ndelta:\n  preview_size: 3\ncampaigns:\n  limit: 100\n",
        )
        .unwrap();
        assert_eq!(cfg.database(None), PathBuf::from("/tmp/acme.db"));
        assert_eq!(cfg.coverage_preview(), Some(10));
        assert_eq!(cfg.coverage_page_size(), Some(25));
        assert_eq!(cfg.delta_preview(), Some(3));
        assert_eq!(cfg.campaign_limit(), Some(100));
    }

    #[test]
    fn flag_overrides_file_and_default_applies() {
        let cfg = Config::parse("database: from-file.db\n").unwrap();
        assert_eq!(cfg.database(Some("flag.db".into())), PathBuf::from("flag.db"));
        assert_eq!(Config::default().database(None), PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(Config::parse("").unwrap().campaign_limit(), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("databse: typo.db\n").is_err());
    }

    #[test]
    fn explicit_path_is_read_and_missing_path_errors() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "campaigns:\n  limit: 7").unwrap();
        assert_eq!(load_config(Some(f.path())).unwrap().campaign_limit(), Some(7));

        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("absent.yaml").as_path())).is_err());
    }
}

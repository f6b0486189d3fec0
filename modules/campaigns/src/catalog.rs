use reconbook_core::ValidationError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A service family worked as one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Campaign {
    Smb,
    Ldap,
    Rdp,
    Winrm,
    Ssh,
    Web,
    Database,
    Ftp,
    Snmp,
    Vnc,
}

/// Exact (port, protocol) pairs OR'd with lowercase service-name substrings.
#[derive(Debug)]
pub struct Rule {
    pub campaign: Campaign,
    pub ports: &'static [(u16, &'static str)],
    pub services: &'static [&'static str],
}

static CATALOG: [Rule; 10] = [
    Rule { campaign: Campaign::Smb, ports: &[(139, "tcp"), (445, "tcp")], services: &["microsoft-ds", "netbios-ssn", "smb"] },
    Rule { campaign: Campaign::Ldap, ports: &[(389, "tcp"), (636, "tcp"), (3268, "tcp"), (3269, "tcp")], services: &["ldap"] },
    Rule { campaign: Campaign::Rdp, ports: &[(3389, "tcp")], services: &["ms-wbt-server", "rdp"] },
    Rule { campaign: Campaign::Winrm, ports: &[(5985, "tcp"), (5986, "tcp")], services: &["winrm", "wsman"] },
    Rule { campaign: Campaign::Ssh, ports: &[(22, "tcp")], services: &["ssh"] },
    Rule {
        campaign: Campaign::Web,
        ports: &[(80, "tcp"), (443, "tcp"), (8000, "tcp"), (8008, "tcp"), (8080, "tcp"), (8443, "tcp"), (8888, "tcp")],
        services: &["http"],
    },
    Rule {
        campaign: Campaign::Database,
        ports: &[(1433, "tcp"), (1521, "tcp"), (3306, "tcp"), (5432, "tcp"), (6379, "tcp"), (27017, "tcp")],
        services: &["ms-sql", "mysql", "postgresql", "oracle", "redis", "mongodb"],
    },
    Rule { campaign: Campaign::Ftp, ports: &[(21, "tcp")], services: &["ftp"] },
    Rule { campaign: Campaign::Snmp, ports: &[(161, "udp")], services: &["snmp"] },
    Rule { campaign: Campaign::Vnc, ports: &[(5900, "tcp"), (5901, "tcp")], services: &["vnc"] },
];

impl Campaign {
    pub const ALL: [Campaign; 10] = [
        Campaign::Smb,
        Campaign::Ldap,
        Campaign::Rdp,
        Campaign::Winrm,
        Campaign::Ssh,
        Campaign::Web,
        Campaign::Database,
        Campaign::Ftp,
        Campaign::Snmp,
        Campaign::Vnc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Campaign::Smb => "smb",
            Campaign::Ldap => "ldap",
            Campaign::Rdp => "rdp",
            Campaign::Winrm => "winrm",
            Campaign::Ssh => "ssh",
            Campaign::Web => "web",
            Campaign::Database => "database",
            Campaign::Ftp => "ftp",
            Campaign::Snmp => "snmp",
            Campaign::Vnc => "vnc",
        }
    }

    pub fn rule(self) -> &'static Rule {
        // catalog rows are declared in enum order
        &CATALOG[self as usize]
    }

    pub fn matches(self, port: u16, protocol: &str, service: Option<&str>) -> bool {
        let rule = self.rule();
        if rule.ports.iter().any(|(p, proto)| *p == port && proto.eq_ignore_ascii_case(protocol.trim())) {
            return true;
        }
        match service.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => {
                let s = s.to_ascii_lowercase();
                rule.services.iter().any(|needle| s.contains(needle))
            }
            None => false,
        }
    }
}

impl fmt::Display for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Campaign {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Campaign::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| ValidationError::UnknownCampaign(s.to_string()))
    }
}

use super::QuotaConfig;
use crate::core::GateError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named quotas used across the application
///
/// | preset         | budget             |
/// |----------------|--------------------|
/// | `login`        | 5 per 15 minutes   |
/// | `registration` | 3 per hour         |
/// | `export`       | 3 per hour         |
/// | `search`       | 30 per minute      |
/// | `upload`       | 10 per hour        |
/// | `api`          | 100 per minute     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum QuotaPreset {
    Login,
    Registration,
    Export,
    Search,
    Upload,
    Api,
}

impl QuotaPreset {
    pub const ALL: [QuotaPreset; 6] = [
        QuotaPreset::Login,
        QuotaPreset::Registration,
        QuotaPreset::Export,
        QuotaPreset::Search,
        QuotaPreset::Upload,
        QuotaPreset::Api,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            QuotaPreset::Login => "login",
            QuotaPreset::Registration => "registration",
            QuotaPreset::Export => "export",
            QuotaPreset::Search => "search",
            QuotaPreset::Upload => "upload",
            QuotaPreset::Api => "api",
        }
    }

    pub const fn config(&self) -> QuotaConfig {
        match self {
            QuotaPreset::Login => QuotaConfig::from_parts(5, Duration::from_secs(15 * 60)),
            QuotaPreset::Registration => QuotaConfig::per_hour(3),
            QuotaPreset::Export => QuotaConfig::per_hour(3),
            QuotaPreset::Search => QuotaConfig::per_minute(30),
            QuotaPreset::Upload => QuotaConfig::per_hour(10),
            QuotaPreset::Api => QuotaConfig::per_minute(100),
        }
    }
}

impl fmt::Display for QuotaPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuotaPreset {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        QuotaPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == lower)
            .ok_or_else(|| {
                GateError::InvalidConfig(format!(
                    "unknown quota preset: {s}. Valid options are: login, registration, export, search, upload, api"
                ))
            })
    }
}

use std::path::Path;

use anyhow::anyhow;
use serde::Deserialize;

use crate::resolver::Dialect;

/// Defaults for the command-line tool, read from a TOML file. Flags given on
/// the command line take precedence.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub dialect: Option<Dialect>,
    pub resolve: Option<bool>,
    pub parallel: Option<bool>,
    pub pretty: Option<bool>,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| anyhow!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).map_err(|err| {
            anyhow!(
                "Failed to parse TOML config in file {} due to error: {}",
                path.display(),
                err
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str("dialect = \"postgres\"\npretty = true\n").unwrap();
        assert_eq!(
            config,
            Config {
                dialect: Some(Dialect::Postgres),
                resolve: None,
                parallel: None,
                pretty: Some(true),
            }
        );
        assert!(toml::from_str::<Config>("colour = true").is_err());
    }
}

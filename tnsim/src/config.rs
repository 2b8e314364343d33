//! Configuration of `tnsim run`.
//!
//! Sources are layered with a clear precedence: built-in defaults, then the
//! configuration file, then environment variables.

use crate::{NetworkConfig, Scheduler};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything `tnsim run` needs
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// The nodes to simulate and the data that feeds them
    #[serde(default)]
    pub network: NetworkConfig,

    /// When cycles run
    #[serde(default)]
    pub schedule: Scheduler,

    /// File to overwrite with the latest cycle's reports
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. The configuration file, if given
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `TNS_<SECTION>__<KEY>` to `<section>.<key>`:
    ///
    /// ```bash
    /// export TNS_SCHEDULE__EVERY="5m"
    /// export TNS_REPORT="/var/lib/tnsim/latest.json"
    /// ```
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if path.exists() {
                config = config.add_source(config::File::from(path))
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        config = config.add_source(
            config::Environment::with_prefix("TNS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let built_config = config.build()?;
        built_config.try_deserialize().map_err(Into::into)
    }
}

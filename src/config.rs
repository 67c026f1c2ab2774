use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{
    oracle::DEFAULT_STATUS_PATH,
    state::DEFAULT_STATE_DIRECTORY,
    tempest::{AdminCredentials, DEFAULT_ADMIN_PASSWORD, DEFAULT_REGION, DEFAULT_WORKSPACE},
};

const DEFAULT_CONFIG_FILE: &str = "/etc/regress-stack/config.toml";
const CONFIG_FILE_ENV: &str = "REGRESS_STACK_CONFIG";

pub struct RegressStackConfig {
    pub state_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub dpkg_status: PathBuf,
    pub tempest_workspace: PathBuf,
    pub credentials: AdminCredentials,
}

impl RegressStackConfig {
    pub fn load() -> anyhow::Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let raw_config = RawConfig::load(Some(file), None)?;
        Ok(raw_config.into())
    }
}

impl From<RawConfig> for RegressStackConfig {
    fn from(raw: RawConfig) -> Self {
        RegressStackConfig {
            state_dir: raw
                .state
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIRECTORY)),
            manifest: raw.modules.manifest,
            dpkg_status: raw
                .dpkg
                .status
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATUS_PATH)),
            tempest_workspace: raw
                .tempest
                .workspace
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE)),
            credentials: AdminCredentials {
                password: raw
                    .keystone
                    .password
                    .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
                auth_url: raw.keystone.url,
                region: raw
                    .keystone
                    .region
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            },
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    state: StateConfig,
    #[serde(default)]
    modules: ModulesConfig,
    #[serde(default)]
    dpkg: DpkgConfig,
    #[serde(default)]
    tempest: TempestConfig,
    #[serde(default)]
    keystone: KeystoneConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct StateConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ModulesConfig {
    manifest: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct DpkgConfig {
    status: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct TempestConfig {
    workspace: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct KeystoneConfig {
    password: Option<String>,
    url: Option<String>,
    region: Option<String>,
}

impl RawConfig {
    fn load(
        file: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(
                File::from(file)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder
            .add_source(
                Environment::with_prefix("REGRESS_STACK")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

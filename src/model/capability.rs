//! Optional capabilities a module can carry.
//!
//! A module without a hook simply has nothing to do at that stage; callers ask
//! the module for the hook instead of probing for it.

use std::path::Path;

use log::debug;

use crate::process::{CommandRunner, Invocation};

/// Brings a module's service into a configured, running state.
pub trait Setup: Send + Sync {
    fn setup(&self, runner: &dyn CommandRunner) -> anyhow::Result<()>;
}

/// Adjusts the tempest configuration for a module's service.
pub trait ConfigureTempest: Send + Sync {
    fn configure_tempest(&self, runner: &dyn CommandRunner, tempest_conf: &Path)
        -> anyhow::Result<()>;
}

/// A single `section/key = value` setting of an ini style file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSetting {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigSetting {
    pub fn new(section: &str, key: &str, value: &str) -> Self {
        ConfigSetting {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Writes ini settings with `crudini --set`, one invocation per setting.
pub fn cfg_set(
    runner: &dyn CommandRunner,
    config_file: &Path,
    settings: &[ConfigSetting],
) -> anyhow::Result<()> {
    for setting in settings {
        let invocation = Invocation::new(
            "crudini",
            [
                "--set".to_string(),
                config_file.display().to_string(),
                setting.section.clone(),
                setting.key.clone(),
                setting.value.clone(),
            ],
        );
        runner.output(&invocation)?;
    }
    Ok(())
}

/// Setup made of a fixed list of commands run in order.
pub struct CommandSetup {
    commands: Vec<Vec<String>>,
}

impl CommandSetup {
    pub fn new(commands: Vec<Vec<String>>) -> Self {
        CommandSetup { commands }
    }
}

impl Setup for CommandSetup {
    fn setup(&self, runner: &dyn CommandRunner) -> anyhow::Result<()> {
        for command in &self.commands {
            let Some((program, args)) = command.split_first() else {
                continue;
            };
            debug!("Running setup step {}", command.join(" "));
            runner.output(&Invocation::new(program, args.iter().cloned()))?;
        }
        Ok(())
    }
}

pub struct CrudiniTempestConfig {
    settings: Vec<ConfigSetting>,
}

impl CrudiniTempestConfig {
    pub fn new(settings: Vec<ConfigSetting>) -> Self {
        CrudiniTempestConfig { settings }
    }
}

impl ConfigureTempest for CrudiniTempestConfig {
    fn configure_tempest(
        &self,
        runner: &dyn CommandRunner,
        tempest_conf: &Path,
    ) -> anyhow::Result<()> {
        cfg_set(runner, tempest_conf, &self.settings)
    }
}

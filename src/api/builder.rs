use std::path::PathBuf;

use crate::{
    oracle::{AssumeInstalled, DpkgStatusOracle, PackageOracle, DEFAULT_STATUS_PATH},
    process::{CommandRunner, SystemCommandRunner},
    registry::ModuleRegistry,
    state::{SetupState, DEFAULT_STATE_DIRECTORY},
    tempest::{AdminCredentials, DEFAULT_WORKSPACE},
    RegressStack,
};

#[derive(Default)]
pub struct RegressStackBuilder {
    manifest: Option<PathBuf>,
    state_directory: Option<PathBuf>,
    dpkg_status: Option<PathBuf>,
    tempest_workspace: Option<PathBuf>,
    credentials: Option<AdminCredentials>,
    assume_installed: bool,
    oracle: Option<Box<dyn PackageOracle>>,
    command_runner: Option<Box<dyn CommandRunner>>,
}

impl RegressStackBuilder {
    /// TOML manifest with extra modules or overrides of the builtin ones.
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    /// Where setup progress is recorded.
    ///
    /// Defaults to `/var/lib/regress-stack`.
    pub fn state_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_directory = Some(path.into());
        self
    }

    /// Location of the dpkg status database used to tell what is installed.
    ///
    /// Defaults to `/var/lib/dpkg/status`.
    pub fn dpkg_status(mut self, path: impl Into<PathBuf>) -> Self {
        self.dpkg_status = Some(path.into());
        self
    }

    /// Tempest workspace directory.
    ///
    /// Defaults to `mycloud01`.
    pub fn tempest_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.tempest_workspace = Some(path.into());
        self
    }

    /// Keystone admin account used by the test stage.
    pub fn admin_credentials(mut self, credentials: AdminCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Treat every package as installed instead of asking dpkg.
    pub fn assume_installed(mut self, assume_installed: bool) -> Self {
        self.assume_installed = assume_installed;
        self
    }

    pub fn oracle(mut self, oracle: impl PackageOracle + 'static) -> Self {
        self.oracle = Some(Box::new(oracle));
        self
    }

    pub fn command_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.command_runner = Some(Box::new(runner));
        self
    }

    pub fn try_build(self) -> anyhow::Result<RegressStack> {
        let Self {
            manifest,
            state_directory,
            dpkg_status,
            tempest_workspace,
            credentials,
            assume_installed,
            oracle,
            command_runner,
        } = self;

        let registry = ModuleRegistry::discover(manifest.as_deref())?;

        let oracle: Box<dyn PackageOracle> = match oracle {
            Some(oracle) => oracle,
            None if assume_installed => Box::new(AssumeInstalled),
            None => Box::new(DpkgStatusOracle::new(
                dpkg_status.unwrap_or_else(|| PathBuf::from(DEFAULT_STATUS_PATH)),
            )),
        };

        let runner = command_runner.unwrap_or_else(|| Box::new(SystemCommandRunner));

        let state = SetupState::new(
            state_directory.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIRECTORY)),
        );

        let tempest_workspace =
            tempest_workspace.unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));

        Ok(RegressStack {
            registry,
            oracle,
            runner,
            state,
            tempest_workspace,
            credentials: credentials.unwrap_or_default(),
        })
    }
}

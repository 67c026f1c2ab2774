use std::{io::Write, path::PathBuf};

use crate::{
    cli::command_handlers::{
        do_collect_logs, do_list_modules, do_packages, do_plan, do_setup, do_test,
    },
    model::PackageFlags,
    oracle::PackageOracle,
    process::CommandRunner,
    registry::ModuleRegistry,
    state::SetupState,
    tempest::{AdminCredentials, TestOptions},
};

mod builder;

pub use builder::RegressStackBuilder;

pub struct RegressStack {
    registry: ModuleRegistry,
    oracle: Box<dyn PackageOracle>,
    runner: Box<dyn CommandRunner>,
    state: SetupState,
    tempest_workspace: PathBuf,
    credentials: AdminCredentials,
}

impl RegressStack {
    pub fn builder() -> RegressStackBuilder {
        RegressStackBuilder::default()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Prints the order in which the modules would be set up
    pub fn plan(&self, target: Option<&str>, out: &mut dyn Write) -> anyhow::Result<()> {
        do_plan(&self.registry, self.oracle.as_ref(), target, out)
    }

    /// Prints the packages needed by `target`, or by every module, on one line
    pub fn packages(
        &self,
        target: Option<&str>,
        flags: PackageFlags,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        do_packages(&self.registry, self.oracle.as_ref(), target, flags, out)
    }

    /// Sets up `target` and its dependencies, or every module that can be set up.
    /// Logs are written to `out` if the setup fails.
    pub fn setup(&self, target: Option<&str>, out: &mut dyn Write) -> anyhow::Result<()> {
        do_setup(
            &self.registry,
            self.oracle.as_ref(),
            self.runner.as_ref(),
            &self.state,
            target,
            out,
        )
    }

    /// Runs the regression tests for every module that was set up
    pub fn test(&self, options: &TestOptions, out: &mut dyn Write) -> anyhow::Result<()> {
        do_test(
            &self.registry,
            self.oracle.as_ref(),
            self.runner.as_ref(),
            &self.state,
            &self.tempest_workspace,
            &self.credentials,
            options,
            out,
        )
    }

    pub fn list_modules(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        do_list_modules(&self.registry, out)
    }

    pub fn collect_logs(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        do_collect_logs(&self.registry, self.oracle.as_ref(), self.runner.as_ref(), out)
    }
}

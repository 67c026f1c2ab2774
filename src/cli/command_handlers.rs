use std::{io::Write, path::Path};

use log::{error, info, warn};

use crate::{
    logs::collect_logs,
    model::PackageFlags,
    oracle::PackageOracle,
    packages::{collect_packages, format_packages},
    process::CommandRunner,
    registry::ModuleRegistry,
    resolver::get_execution_order,
    setup::run_setup,
    state::SetupState,
    tempest::{AdminCredentials, TempestStage, TestOptions, TestsFailed},
};

/// Handler to plan command
pub fn do_plan(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    target: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let order = get_execution_order(registry, oracle, target, true)?;
    writeln!(out, "Execution Order:")?;
    for (position, module) in order.iter().enumerate() {
        writeln!(out, "{}. {}", position + 1, module)?;
    }
    Ok(())
}

/// Handler to packages command
/// Lists packages for every module, whether installed or not
pub fn do_packages(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    target: Option<&str>,
    flags: PackageFlags,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let order = get_execution_order(registry, oracle, target, false)?;
    let packages = collect_packages(&order, flags);
    writeln!(out, "{}", format_packages(&packages))?;
    Ok(())
}

/// Handler to setup command
/// On failure the logs of every module are written to `out` before the error is returned
pub fn do_setup(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    runner: &dyn CommandRunner,
    state: &SetupState,
    target: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let order = get_execution_order(registry, oracle, target, true)?;
    if let Err(e) = run_setup(&order, runner, state) {
        error!("Failed to setup {}: {:#}", target.unwrap_or("modules"), e);
        collect_logs_after_failure(registry, oracle, runner, out);
        return Err(e);
    }
    info!("Setup complete");
    Ok(())
}

/// Handler to test command
pub fn do_test(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    runner: &dyn CommandRunner,
    state: &SetupState,
    workspace: &Path,
    credentials: &AdminCredentials,
    options: &TestOptions,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let order = get_execution_order(registry, oracle, None, true)?;
    let result = TempestStage::new(runner, workspace)
        .credentials(credentials.clone())
        .run(&order, state, options, out);
    if let Err(e) = &result {
        if e.is::<TestsFailed>() {
            collect_logs_after_failure(registry, oracle, runner, out);
        }
    }
    result
}

/// Handler to list-modules command
pub fn do_list_modules(registry: &ModuleRegistry, out: &mut dyn Write) -> anyhow::Result<()> {
    for name in registry.list_module_names() {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

/// Handler to collect-logs command
pub fn do_collect_logs(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    runner: &dyn CommandRunner,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let order = get_execution_order(registry, oracle, None, true)?;
    collect_logs(&order, runner, out)
}

fn collect_logs_after_failure(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    runner: &dyn CommandRunner,
    out: &mut dyn Write,
) {
    if let Err(e) = do_collect_logs(registry, oracle, runner, out) {
        warn!("Could not collect logs: {:#}", e);
    }
}

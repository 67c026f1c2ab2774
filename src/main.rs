use std::io::Write;

use clap::Parser;

use regress_stack::{
    cli::args::{CliArgs, Command},
    config::RegressStackConfig,
    model::PackageFlags,
    tempest::TestOptions,
    RegressStack,
};

fn main() {
    let cli_args: CliArgs = CliArgs::parse();

    let default_filter = if cli_args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli_args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli_args: CliArgs) -> anyhow::Result<()> {
    let config = RegressStackConfig::load()?;

    let mut builder = RegressStack::builder()
        .state_directory(cli_args.state_dir.unwrap_or(config.state_dir))
        .dpkg_status(config.dpkg_status)
        .tempest_workspace(config.tempest_workspace)
        .admin_credentials(config.credentials)
        .assume_installed(cli_args.assume_installed);
    if let Some(manifest) = cli_args.manifest.or(config.manifest) {
        builder = builder.manifest(manifest);
    }
    let regress_stack = builder.try_build()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli_args.cmd {
        Command::Plan { target } => regress_stack.plan(target.as_deref(), &mut out)?,
        Command::Packages { target, no_tempest } => regress_stack.packages(
            target.as_deref(),
            PackageFlags {
                skip_tempest: no_tempest,
            },
            &mut out,
        )?,
        Command::Setup { target } => regress_stack.setup(target.as_deref(), &mut out)?,
        Command::Test {
            concurrency,
            retry_failed,
        } => {
            let options = TestOptions {
                concurrency,
                retry_failed,
                ..Default::default()
            }
            .with_env_filters();
            regress_stack.test(&options, &mut out)?
        }
        Command::ListModules => regress_stack.list_modules(&mut out)?,
        Command::CollectLogs => regress_stack.collect_logs(&mut out)?,
    }

    out.flush()?;
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;

use crate::tempest::Concurrency;

/// Sets up OpenStack services on a single machine and runs regression tests against them.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    #[clap(long)]
    /// TOML manifest with extra modules or overrides of the builtin ones.
    /// Defaults to the `modules.manifest` config value, if any.
    pub manifest: Option<PathBuf>,
    #[clap(long)]
    /// Directory where setup progress is recorded.
    /// Defaults to the `state.dir` config value, or /var/lib/regress-stack.
    pub state_dir: Option<PathBuf>,
    #[clap(long)]
    /// Treat every package as installed instead of reading the dpkg database
    pub assume_installed: bool,
    #[clap(short, long)]
    /// Log debug messages
    pub verbose: bool,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Prints the order in which modules would be set up
    Plan {
        /// Only this module and what it depends on
        target: Option<String>,
    },
    /// Prints the packages to install, space separated
    Packages {
        /// Only this module and what it depends on
        target: Option<String>,
        #[clap(long)]
        /// Leave out the packages only needed to run the tests
        no_tempest: bool,
    },
    /// Sets up the modules in order
    Setup {
        /// Only this module and what it depends on
        target: Option<String>,
    },
    /// Runs the regression tests with tempest
    Test {
        #[clap(long, default_value = "1")]
        /// Number of test workers, or `auto` for a third of the CPUs
        concurrency: Concurrency,
        #[clap(long, default_value_t = 0)]
        /// Number of times failing tests are run again
        retry_failed: u32,
    },
    /// Lists every known module
    ListModules,
    /// Prints the logs of every module and the system journal
    CollectLogs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn verify_cli() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parse_test_options() {
        let args = CliArgs::parse_from([
            "regress-stack",
            "--state-dir",
            "/tmp/state",
            "test",
            "--concurrency",
            "3",
            "--retry-failed",
            "2",
        ]);
        assert_eq!(args.state_dir, Some(PathBuf::from("/tmp/state")));
        match args.cmd {
            Command::Test {
                concurrency,
                retry_failed,
            } => {
                assert_eq!(concurrency.workers(), 3);
                assert_eq!(retry_failed, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reject_invalid_concurrency() {
        let result = CliArgs::try_parse_from(["regress-stack", "test", "--concurrency", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_packages() {
        let args = CliArgs::parse_from(["regress-stack", "packages", "nova", "--no-tempest"]);
        match args.cmd {
            Command::Packages { target, no_tempest } => {
                assert_eq!(target.as_deref(), Some("nova"));
                assert!(no_tempest);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

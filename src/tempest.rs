//! Regression test stage driven by tempest.
//!
//! The stage prepares a tempest workspace, lets every module that finished its
//! setup adjust `etc/tempest.conf`, builds the test selection from the modules'
//! include and exclude regexes, runs it, and retries the failing tests.

use std::{collections::BTreeMap, fmt::Display, io::Write, path::PathBuf, str::FromStr, sync::Arc};

use log::{info, warn};
use thiserror::Error;

use crate::{
    model::{capability::cfg_set, capability::ConfigSetting, Module, TestFilters},
    process::{banner, measure, CommandError, CommandRunner, Invocation},
    state::SetupState,
};

pub const DEFAULT_WORKSPACE: &str = "mycloud01";
pub const INCLUDE_ENV: &str = "TEST_INCLUDE_REGEXES";
pub const EXCLUDE_ENV: &str = "TEST_EXCLUDE_REGEXES";
pub const DEFAULT_ADMIN_PASSWORD: &str = "changeme";
pub const DEFAULT_REGION: &str = "AutoPkgOne";

const KEYSTONE_PORT: u16 = 5000;
const ADMIN: &str = "admin";
const ADMIN_DOMAIN: &str = "Default";

const TEST_LIST_FILE_NAME: &str = "regress_tests.txt";
const BASE_INCLUDE_REGEX: &str = "smoke";

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid concurrency `{0}`: expected a positive number or `auto`")]
pub struct ConcurrencyError(String);

/// Number of tempest workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency(usize);

impl Concurrency {
    pub fn new(workers: usize) -> Result<Self, ConcurrencyError> {
        if workers == 0 {
            Err(ConcurrencyError(workers.to_string()))
        } else {
            Ok(Concurrency(workers))
        }
    }

    /// A third of the available CPUs, at least one.
    pub fn auto() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Concurrency((cpus / 3).max(1))
    }

    pub fn workers(&self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency(1)
    }
}

impl Display for Concurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for Concurrency {
    type Err = ConcurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(Concurrency::auto());
        }
        s.parse::<usize>()
            .map_err(|_| ConcurrencyError(s.to_string()))
            .and_then(Concurrency::new)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
    pub concurrency: Concurrency,
    /// How many times failing tests are run again before giving up.
    pub retry_failed: u32,
    /// Extra include and exclude regexes, `|` separated, as read from the
    /// `TEST_INCLUDE_REGEXES` and `TEST_EXCLUDE_REGEXES` environment variables.
    pub extra_filters: TestFilters,
}

impl TestOptions {
    pub fn with_env_filters(mut self) -> Self {
        self.extra_filters = TestFilters {
            include: split_env(INCLUDE_ENV),
            exclude: split_env(EXCLUDE_ENV),
        };
        self
    }
}

fn split_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|value| value.split('|').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Keystone admin account the OpenStack clients started by the test stage log in with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub password: String,
    /// Identity endpoint. Derived from the host's fully qualified name when unset.
    pub auth_url: Option<String>,
    pub region: String,
}

impl Default for AdminCredentials {
    fn default() -> Self {
        AdminCredentials {
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
            auth_url: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl AdminCredentials {
    /// `OS_*` variables for the OpenStack command line clients.
    pub fn auth_env(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<BTreeMap<String, String>, CommandError> {
        let auth_url = match &self.auth_url {
            Some(auth_url) => auth_url.clone(),
            None => {
                let fqdn = runner.output(&Invocation::new("hostname", ["--fqdn"]))?;
                format!("http://{}:{}/v3/", fqdn.trim(), KEYSTONE_PORT)
            }
        };
        Ok([
            ("OS_USERNAME", ADMIN),
            ("OS_PASSWORD", self.password.as_str()),
            ("OS_PROJECT_NAME", ADMIN),
            ("OS_USER_DOMAIN_NAME", ADMIN_DOMAIN),
            ("OS_PROJECT_DOMAIN_NAME", ADMIN_DOMAIN),
            ("OS_AUTH_URL", auth_url.as_str()),
            ("OS_IDENTITY_API_VERSION", "3"),
            ("OS_REGION_NAME", self.region.as_str()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
    }
}

/// The test run finished but some tests still fail after every retry.
#[derive(Error, Debug)]
#[error("Tests are still failing after {retries} retries")]
pub struct TestsFailed {
    pub retries: u32,
    #[source]
    pub source: CommandError,
}

/// Combined `(include, exclude)` regexes for `tempest run`.
///
/// The include regex always selects the smoke tests. A filter list only counts
/// when its first entry is not empty.
pub fn build_test_regexes<'a>(
    filters: impl IntoIterator<Item = &'a TestFilters>,
) -> (String, String) {
    let mut include = vec![BASE_INCLUDE_REGEX.to_string()];
    let mut exclude = Vec::new();
    for filters in filters {
        if filters.include.first().is_some_and(|r| !r.is_empty()) {
            include.push(filters.include.join("|"));
        }
        if filters.exclude.first().is_some_and(|r| !r.is_empty()) {
            exclude.push(filters.exclude.join("|"));
        }
    }
    (include.join("|"), exclude.join("|"))
}

/// Runs the regression tests for the modules in `order` that were set up.
pub struct TempestStage<'a> {
    runner: &'a dyn CommandRunner,
    workspace: PathBuf,
    credentials: AdminCredentials,
}

impl<'a> TempestStage<'a> {
    pub fn new(runner: &'a dyn CommandRunner, workspace: impl Into<PathBuf>) -> Self {
        TempestStage {
            runner,
            workspace: workspace.into(),
            credentials: AdminCredentials::default(),
        }
    }

    pub fn credentials(mut self, credentials: AdminCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn tempest_conf(&self) -> PathBuf {
        self.workspace.join("etc").join("tempest.conf")
    }

    pub fn run(
        &self,
        order: &[Arc<Module>],
        state: &SetupState,
        options: &TestOptions,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        measure("test", || -> anyhow::Result<()> {
            let env = self.credentials.auth_env(self.runner)?;
            self.prepare_workspace()?;
            self.discover_config(&env)?;

            let tempest_conf = self.tempest_conf();
            let mut filters = Vec::new();
            for module in order {
                if !state.is_setup_done(module.name()) {
                    info!("Skipping {}", module);
                    continue;
                }
                if let Some(hook) = module.tempest_hook() {
                    measure(&format!("configure_tempest {}", module), || {
                        hook.configure_tempest(self.runner, &tempest_conf)
                    })?;
                }
                filters.push(module.test_filters());
            }
            filters.push(&options.extra_filters);

            self.write_test_list(build_test_regexes(filters), &env)?;
            self.run_tests(options, &env, out)
        })
    }

    fn prepare_workspace(&self) -> anyhow::Result<()> {
        let name = self.workspace_name();
        let workspaces = self.runner.output(&Invocation::new(
            "tempest",
            ["workspace", "list", "--format", "value", "--column", "Name"],
        ))?;
        if workspaces.lines().any(|line| line.trim() == name) {
            info!("Tempest workspace {} already exists, skipping init", name);
        } else {
            self.runner.output(&Invocation::new(
                "tempest",
                ["init".to_string(), self.workspace.display().to_string()],
            ))?;
        }
        Ok(())
    }

    fn discover_config(&self, env: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let release = self
            .runner
            .output(&Invocation::new("lsb_release", ["-cs"]))?
            .trim()
            .to_string();
        let image = cloud_image_url(&release, ubuntu_arch(std::env::consts::ARCH));
        self.runner.output(
            &Invocation::new(
                "discover-tempest-config",
                [
                    "--create",
                    "--flavor-min-mem",
                    "1024",
                    "--flavor-min-disk",
                    "5",
                    "--image",
                    image.as_str(),
                ],
            )
            .envs(env)
            .current_dir(&self.workspace),
        )?;
        cfg_set(
            self.runner,
            &self.tempest_conf(),
            &[
                ConfigSetting::new("validation", "image_ssh_user", "ubuntu"),
                ConfigSetting::new("validation", "image_alt_ssh_user", "ubuntu"),
            ],
        )
    }

    fn write_test_list(
        &self,
        (include, exclude): (String, String),
        env: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        info!("Building test list");
        let tests = self.runner.output(
            &Invocation::new(
                "tempest",
                [
                    "run",
                    "--list",
                    "--regex",
                    include.as_str(),
                    "--exclude-regex",
                    exclude.as_str(),
                ],
            )
            .envs(env)
            .current_dir(&self.workspace),
        )?;
        std::fs::write(self.workspace.join(TEST_LIST_FILE_NAME), tests)?;
        Ok(())
    }

    fn run_tests(
        &self,
        options: &TestOptions,
        env: &BTreeMap<String, String>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let concurrency = options.concurrency.to_string();
        let run = Invocation::new(
            "tempest",
            [
                "run",
                "--load-list",
                TEST_LIST_FILE_NAME,
                "--concurrency",
                concurrency.as_str(),
            ],
        )
        .envs(env)
        .current_dir(&self.workspace);
        if let Err(error) = self.runner.status(&run) {
            warn!("{}", error);
        }

        let failing = Invocation::new("stestr", ["failing", "--list"]).current_dir(&self.workspace);
        let rerun = Invocation::new(
            "stestr",
            ["run", "--failing", "--concurrency", concurrency.as_str()],
        )
        .envs(env)
        .current_dir(&self.workspace);

        let mut retries = 0;
        loop {
            write!(out, "{}", banner("START Fetching failing tests"))?;
            let result = self.runner.output(&failing);
            write!(out, "{}", banner("END Fetching failing tests"))?;
            match result {
                Ok(_) => return Ok(()),
                Err(source) if retries >= options.retry_failed => {
                    return Err(TestsFailed { retries, source }.into());
                }
                Err(_) => {
                    retries += 1;
                    warn!(
                        "Failed to fetch failing tests, retrying ({}/{})",
                        retries, options.retry_failed
                    );
                    if let Err(error) = self.runner.status(&rerun) {
                        warn!("{}", error);
                    }
                }
            }
        }
    }

    fn workspace_name(&self) -> String {
        self.workspace
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.workspace.display().to_string())
    }
}

fn ubuntu_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64el",
        other => other,
    }
}

fn cloud_image_url(release: &str, arch: &str) -> String {
    format!(
        "http://cloud-images.ubuntu.com/{release}/current/{release}-server-cloudimg-{arch}.img"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{ModuleDefinition, ModuleName},
        process::testing::RecordingRunner,
    };

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_concurrency() {
        assert_eq!("4".parse::<Concurrency>().unwrap().workers(), 4);
        assert!("auto".parse::<Concurrency>().unwrap().workers() >= 1);
        assert_eq!(
            "0".parse::<Concurrency>().unwrap_err(),
            ConcurrencyError("0".to_string())
        );
        assert_eq!(
            "many".parse::<Concurrency>().unwrap_err().to_string(),
            "Invalid concurrency `many`: expected a positive number or `auto`"
        );
    }

    #[test]
    fn regexes_always_include_smoke() {
        let barbican = TestFilters {
            include: vec!["barbican_tempest_plugin".into()],
            exclude: vec![],
        };
        let nova = TestFilters {
            include: vec!["compute".into(), "servers".into()],
            exclude: vec!["test_rescue".into()],
        };
        let env = TestFilters {
            include: vec!["".into()],
            exclude: vec!["slow".into(), "flaky".into()],
        };

        let empty = TestFilters::default();
        let (include, exclude) = build_test_regexes([&barbican, &empty, &nova, &env]);

        assert_eq!(include, "smoke|barbican_tempest_plugin|compute|servers");
        assert_eq!(exclude, "test_rescue|slow|flaky");
        assert_eq!(build_test_regexes([]), ("smoke".to_string(), String::new()));
    }

    #[test]
    fn image_url_for_release() {
        assert_eq!(
            cloud_image_url("noble", ubuntu_arch("x86_64")),
            "http://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img"
        );
    }

    fn stage_fixture() -> (tempfile::TempDir, SetupState, Vec<Arc<Module>>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mycloud01")).unwrap();
        let state = SetupState::new(dir.path().join("state"));
        let order = vec![
            Arc::new(Module::from_definition(
                ModuleDefinition::new("barbican")
                    .test_include(&["barbican_tempest_plugin"])
                    .tempest_setting("service_available", "barbican", "true"),
            )),
            Arc::new(Module::from_definition(
                ModuleDefinition::new("heat")
                    .test_include(&["heat"])
                    .tempest_setting("service_available", "heat_plugin", "true"),
            )),
        ];
        state.mark_setup(&ModuleName::from("barbican")).unwrap();
        (dir, state, order)
    }

    fn runner(failing_lists: usize) -> RecordingRunner {
        let mut runner = RecordingRunner::failing("stestr failing --list", failing_lists);
        runner
            .outputs
            .insert("hostname --fqdn".to_string(), "node1.example\n".to_string());
        runner
            .outputs
            .insert("lsb_release -cs".to_string(), "noble\n".to_string());
        runner.outputs.insert(
            "tempest workspace list --format value --column Name".to_string(),
            "other\nmycloud01\n".to_string(),
        );
        runner.outputs.insert(
            "tempest run --list --regex smoke|barbican_tempest_plugin --exclude-regex ".to_string(),
            "tempest.api.test_one\n".to_string(),
        );
        runner
    }

    #[test]
    fn run_configures_setup_modules_only() {
        let (dir, state, order) = stage_fixture();
        let workspace = dir.path().join("mycloud01");
        let runner = runner(0);
        let stage = TempestStage::new(&runner, &workspace);

        let mut out = Vec::new();
        stage
            .run(&order, &state, &TestOptions::default(), &mut out)
            .unwrap();

        let conf = workspace.join("etc/tempest.conf").display().to_string();
        let commands = runner.commands();
        assert_eq!(
            commands,
            vec![
                "hostname --fqdn".to_string(),
                "tempest workspace list --format value --column Name".to_string(),
                "lsb_release -cs".to_string(),
                format!(
                    "discover-tempest-config --create --flavor-min-mem 1024 --flavor-min-disk 5 --image {}",
                    cloud_image_url("noble", ubuntu_arch(std::env::consts::ARCH))
                ),
                format!("crudini --set {conf} validation image_ssh_user ubuntu"),
                format!("crudini --set {conf} validation image_alt_ssh_user ubuntu"),
                format!("crudini --set {conf} service_available barbican true"),
                "tempest run --list --regex smoke|barbican_tempest_plugin --exclude-regex "
                    .to_string(),
                "tempest run --load-list regress_tests.txt --concurrency 1".to_string(),
                "stestr failing --list".to_string(),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(workspace.join(TEST_LIST_FILE_NAME)).unwrap(),
            "tempest.api.test_one\n"
        );

        let authenticated: Vec<String> = runner
            .invocations
            .borrow()
            .iter()
            .filter(|invocation| !invocation.env.is_empty())
            .map(|invocation| {
                assert_eq!(invocation.env["OS_USERNAME"], "admin");
                assert_eq!(invocation.env["OS_PASSWORD"], "changeme");
                assert_eq!(invocation.env["OS_PROJECT_NAME"], "admin");
                assert_eq!(
                    invocation.env["OS_AUTH_URL"],
                    "http://node1.example:5000/v3/"
                );
                assert_eq!(invocation.env["OS_REGION_NAME"], "AutoPkgOne");
                invocation.program.clone()
            })
            .collect();
        assert_eq!(
            authenticated,
            vec!["discover-tempest-config", "tempest", "tempest"]
        );

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("START Fetching failing tests"));
        assert!(out.contains("END Fetching failing tests"));
    }

    #[test]
    fn configured_auth_url_skips_hostname_lookup() {
        let runner = RecordingRunner::default();
        let credentials = AdminCredentials {
            password: "secret".to_string(),
            auth_url: Some("https://keystone.internal/v3/".to_string()),
            ..Default::default()
        };

        let env = credentials.auth_env(&runner).unwrap();

        assert!(runner.commands().is_empty());
        assert_eq!(env.len(), 8);
        assert_eq!(env["OS_PASSWORD"], "secret");
        assert_eq!(env["OS_AUTH_URL"], "https://keystone.internal/v3/");
        assert_eq!(env["OS_IDENTITY_API_VERSION"], "3");
        assert_eq!(env["OS_USER_DOMAIN_NAME"], "Default");
    }

    #[test]
    fn failing_tests_are_retried() {
        let (dir, state, order) = stage_fixture();
        let workspace = dir.path().join("mycloud01");
        let runner = runner(1);
        let stage = TempestStage::new(&runner, &workspace);
        let options = TestOptions {
            concurrency: Concurrency::new(2).unwrap(),
            retry_failed: 2,
            ..Default::default()
        };

        let mut out = Vec::new();
        stage.run(&order, &state, &options, &mut out).unwrap();

        let commands = runner.commands();
        let tail: Vec<&str> = commands[commands.len() - 4..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(
            String::from_utf8(out)
                .unwrap()
                .matches("START Fetching failing tests")
                .count(),
            2
        );
        assert_eq!(
            tail,
            vec![
                "tempest run --load-list regress_tests.txt --concurrency 2",
                "stestr failing --list",
                "stestr run --failing --concurrency 2",
                "stestr failing --list",
            ]
        );
    }

    #[test]
    fn gives_up_after_last_retry() {
        let (dir, state, order) = stage_fixture();
        let workspace = dir.path().join("mycloud01");
        let runner = runner(5);
        let stage = TempestStage::new(&runner, &workspace);
        let options = TestOptions {
            retry_failed: 1,
            ..Default::default()
        };

        let mut out = Vec::new();
        let err = stage.run(&order, &state, &options, &mut out).unwrap_err();

        let failed = err.downcast_ref::<TestsFailed>().unwrap();
        assert_eq!(failed.retries, 1);
        let reruns = runner
            .commands()
            .iter()
            .filter(|c| c.starts_with("stestr run"))
            .count();
        assert_eq!(reruns, 1);
    }

    #[test]
    fn workspace_is_initialised_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("fresh");
        let runner = RecordingRunner::default();
        let stage = TempestStage::new(&runner, &workspace);

        stage.prepare_workspace().unwrap();

        assert_eq!(
            runner.commands()[1],
            format!("tempest init {}", workspace.display())
        );
    }
}

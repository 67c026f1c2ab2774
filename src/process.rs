use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};

use log::{debug, error, info};
use thiserror::Error;

const BANNER_WIDTH: usize = 80;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Could not start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command {command} failed with exit code {code:?}")]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// A program invocation with its arguments, extra environment and working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(&self.env);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external programs on behalf of the orchestration stages.
pub trait CommandRunner {
    /// Runs to completion with captured output and returns stdout.
    fn output(&self, invocation: &Invocation) -> Result<String, CommandError>;

    /// Runs with inherited stdio, for long running programs whose output goes
    /// straight to the user.
    fn status(&self, invocation: &Invocation) -> Result<(), CommandError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn output(&self, invocation: &Invocation) -> Result<String, CommandError> {
        let output = invocation
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command: invocation.to_string(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            error!(
                "Command {:?} failed with exit code {:?}",
                invocation.program,
                output.status.code()
            );
            error!("Command {:?} stdout: {}", invocation.program, stdout);
            error!("Command {:?} stderr: {}", invocation.program, stderr);
            return Err(CommandError::Failed {
                command: invocation.to_string(),
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        debug!(
            "Command {:?} stdout: {}, stderr: {}",
            invocation.to_string(),
            stdout,
            stderr
        );
        Ok(stdout)
    }

    fn status(&self, invocation: &Invocation) -> Result<(), CommandError> {
        let status = invocation
            .command()
            .status()
            .map_err(|source| CommandError::Spawn {
                command: invocation.to_string(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command: invocation.to_string(),
                code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

/// Runs `f` and reports how long it took.
pub fn measure<T>(section: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    info!("{}: {:.2}s", section, start.elapsed().as_secs_f64());
    result
}

pub fn banner(msg: &str) -> String {
    let line = "#".repeat(BANNER_WIDTH);
    format!("{line}\n{:#^width$}\n{line}\n", msg, width = BANNER_WIDTH)
}

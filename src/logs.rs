use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    model::Module,
    process::{banner, CommandRunner, Invocation},
};

/// Writes every module's log files, then the system journal, to `out`.
///
/// Directories are expanded one level. Paths that do not exist are skipped.
pub fn collect_logs(
    order: &[Arc<Module>],
    runner: &dyn CommandRunner,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    for module in order {
        let mut logs = module.logs().peekable();
        if logs.peek().is_none() {
            continue;
        }
        let section = format!("Collecting logs for {}", module);
        out.write_all(banner(&format!("START {section}")).as_bytes())?;
        for path in logs {
            for file in log_files(path) {
                write_log_file(&file, out)?;
            }
        }
        out.write_all(banner(&format!("END {section}")).as_bytes())?;
    }

    out.write_all(banner("Collecting journal logs").as_bytes())?;
    let journal = runner.output(&Invocation::new(
        "journalctl",
        ["-o", "short-precise", "--no-pager"],
    ))?;
    out.write_all(journal.as_bytes())?;
    out.write_all(banner("Collected journal logs").as_bytes())?;
    out.flush()?;
    Ok(())
}

fn log_files(path: &Path) -> Vec<PathBuf> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(path) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect(),
            Err(error) => {
                warn!("Could not list {}: {}", path.display(), error);
                Vec::new()
            }
        };
        files.sort();
        files
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        debug!("Skipping missing log {}", path.display());
        Vec::new()
    }
}

fn write_log_file(path: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    match std::fs::read(path) {
        Ok(contents) => out.write_all(String::from_utf8_lossy(&contents).as_bytes())?,
        Err(error) => warn!("Could not read {}: {}", path.display(), error),
    }
    Ok(())
}

//! Provision the key file for the lifetime of one child process.

use anyhow::{Context, Result};
use diarium::{Key, KeyFile};
use std::process::{Command, ExitStatus};
use tracing::info;

/// Writes `key`, runs `command` to completion, then truncates the key file.
///
/// The key file is cleared whether or not the program could be launched.
/// Ctrl-C is left to the child; this process keeps waiting so it can still
/// wipe the key afterwards.
pub fn run_with_key(key_file: &KeyFile, key: &Key, command: &[String]) -> Result<ExitStatus> {
    let (program, args) = command.split_first().context("no program given to run")?;

    ctrlc::set_handler(|| info!("interrupt received; waiting for the journal to exit"))
        .context("failed to install Ctrl-C handler")?;

    key_file.save(key)?;

    info!(%program, "launching journal with provisioned key");
    let outcome = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to launch '{program}'"));

    let wiped = key_file.clear();

    let status = outcome?;
    wiped.context("failed to wipe key file after session")?;

    info!(?status, "session ended; key file wiped");
    Ok(status)
}

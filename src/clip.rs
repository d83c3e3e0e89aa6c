//! Thin wrapper around the platform clipboard command.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::debug;

#[cfg(target_os = "macos")]
const CANDIDATES: &[(&str, &[&str])] = &[("pbcopy", &[])];

#[cfg(not(target_os = "macos"))]
const CANDIDATES: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// Copy `text` to the system clipboard via the first available helper
/// command. Fails when no helper accepts the text.
pub fn copy(text: &str) -> Result<()> {
    for (program, args) in CANDIDATES {
        let spawned = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(_) => continue,
        };
        child
            .stdin
            .take()
            .context("clipboard helper did not expose stdin")?
            .write_all(text.as_bytes())
            .with_context(|| format!("failed to write to {program}"))?;
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for {program}"))?;
        if status.success() {
            debug!(program = %program, "copied to clipboard");
            return Ok(());
        }
    }
    bail!("no clipboard helper available");
}

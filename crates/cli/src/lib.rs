//! # Tabkeeper CLI
//!
//! Runs the engine against a session layout file through the in-memory host.
//! Useful for trying merge/sort/dedupe behavior on a saved window layout and
//! for replaying scripted browsing sessions.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use tabkeeper_engine::EngineConfig;
use tabkeeper_memory_host::SessionLayout;

mod script;
mod session;

pub use script::{parse_script, Step};
pub use session::{run_session, CommandReport, SessionOutput};

pub const ENV_PRETTY: &str = "TABKEEPER_PRETTY";

#[must_use]
pub fn env_truthy(var: &str) -> bool {
    env::var(var)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn load_layout(path: &Path) -> Result<SessionLayout> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read layout {}", path.display()))?;
    SessionLayout::from_json(&raw).with_context(|| format!("Invalid layout {}", path.display()))
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&raw).with_context(|| format!("Invalid script {}", path.display()))
}

/// File config (when given) with `TABKEEPER_*` environment overrides on top.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    base.with_env_overrides()
        .context("Invalid TABKEEPER_* environment override")
}

pub fn write_layout(path: &Path, layout: &SessionLayout) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(layout)?)
        .with_context(|| format!("Failed to write layout {}", path.display()))
}

pub fn render_output(output: &SessionOutput, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    })
}

pub fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

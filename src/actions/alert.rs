//! Out-of-process alert delivery for zone violations.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub trait Alerter: Send {
    fn send(&self, recipient: &str, message: &str) -> Result<()>;
}

/// Runs `<script> <recipient> <message>` once per recipient.
///
/// Relative script paths name a file under the working directory, never a `PATH` lookup.
#[derive(Clone, Debug)]
pub struct ScriptAlerter {
    script: PathBuf,
}

impl ScriptAlerter {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(script, &base)
    }

    /// Resolve a relative `script` against `base`.
    pub fn in_dir(script: impl Into<PathBuf>, base: &Path) -> Self {
        let script = script.into();
        let script = if script.is_relative() {
            base.join(script)
        } else {
            script
        };
        Self { script }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl Alerter for ScriptAlerter {
    fn send(&self, recipient: &str, message: &str) -> Result<()> {
        let output = Command::new(&self.script)
            .arg(recipient)
            .arg(message)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run alert script {}", self.script.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "alert script {} exited with {}: {}",
                self.script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

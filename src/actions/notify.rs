//! Local desktop notifications.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::NotifierKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

pub trait Notifier: Send {
    fn name(&self) -> &'static str;
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Notifier for `NOTIFIER=auto|command|log`. `auto` uses the platform tool when it is
/// installed and falls back to the log.
pub fn notifier_for(kind: NotifierKind) -> Box<dyn Notifier> {
    match kind {
        NotifierKind::Log => Box::new(LogNotifier),
        NotifierKind::Command => Box::new(CommandNotifier::for_platform()),
        NotifierKind::Auto => {
            let command = CommandNotifier::for_platform();
            if command.is_available() {
                Box::new(command)
            } else {
                log::warn!(
                    "notifications: `{}` not found, logging notifications instead",
                    command.program()
                );
                Box::new(LogNotifier)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        match &notification.attachment {
            Some(path) => log::info!(
                "NOTIFY {}: {} [{}]",
                notification.title,
                notification.body,
                path.display()
            ),
            None => log::info!("NOTIFY {}: {}", notification.title, notification.body),
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandNotifier {
    /// `osascript -e 'display notification ...'`
    AppleScript,
    /// `notify-send [-i image] title body`
    NotifySend,
}

impl CommandNotifier {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            CommandNotifier::AppleScript
        } else {
            CommandNotifier::NotifySend
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            CommandNotifier::AppleScript => "osascript",
            CommandNotifier::NotifySend => "notify-send",
        }
    }

    pub fn is_available(self) -> bool {
        let probe = match self {
            CommandNotifier::AppleScript => Command::new("osascript").args(["-e", "return"]).status(),
            CommandNotifier::NotifySend => Command::new("notify-send").arg("--version").status(),
        };
        probe.map(|status| status.success()).unwrap_or(false)
    }

    pub fn args(self, notification: &Notification) -> Vec<String> {
        match self {
            CommandNotifier::AppleScript => vec![
                "-e".to_string(),
                format!(
                    "display notification \"{}\" with title \"{}\" sound name \"default\"",
                    applescript_escape(&notification.body),
                    applescript_escape(&notification.title)
                ),
            ],
            CommandNotifier::NotifySend => {
                let mut args = Vec::new();
                if let Some(path) = &notification.attachment {
                    args.push("-i".to_string());
                    args.push(path.display().to_string());
                }
                args.push(notification.title.clone());
                args.push(notification.body.clone());
                args
            }
        }
    }
}

impl Notifier for CommandNotifier {
    fn name(&self) -> &'static str {
        self.program()
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        let output = Command::new(self.program())
            .args(self.args(notification))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.program()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

fn applescript_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

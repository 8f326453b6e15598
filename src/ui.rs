//! Startup stage reporting for the binaries: a spinner per pre-flight stage on a TTY,
//! plain `==>` lines otherwise (e.g. under launchd, where stderr goes to a log file).

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::RefCell;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_flag(flag: &str, is_tty: bool) -> Self {
        let mode = match flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if !self.pretty() {
            eprintln!("==> {}", name);
            return StageGuard::new(name, None);
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!("{name}…"));
        StageGuard::new(name, Some(spinner))
    }
}

/// Ends its stage when dropped, reporting elapsed time and any detail or warning.
pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    detail: RefCell<Option<String>>,
    warning: RefCell<Option<String>>,
}

impl StageGuard {
    fn new(name: &str, spinner: Option<ProgressBar>) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            detail: RefCell::new(None),
            warning: RefCell::new(None),
        }
    }

    /// Shown after the stage name on completion, e.g. the probed geometry.
    pub fn detail(&self, detail: impl Into<String>) {
        *self.detail.borrow_mut() = Some(detail.into());
    }

    /// Completes the stage with a warning marker instead of a check.
    pub fn warn(&self, warning: impl Into<String>) {
        *self.warning.borrow_mut() = Some(warning.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let detail = self
            .detail
            .borrow()
            .as_ref()
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        let message = match self.warning.borrow().as_ref() {
            Some(warning) => format!("! {}{} ({}) - {}", self.name, detail, elapsed, warning),
            None => format!("✔ {}{} ({})", self.name, detail, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

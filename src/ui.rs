//! Terminal feedback while a scan or history request is outstanding.
//!
//! With stderr on a terminal the request gets an animated spinner; otherwise a
//! start line and a result line are written, so piped output and logs stay
//! readable. The `--ui` flag can force either behaviour.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

const SPINNER_TICK: Duration = Duration::from_millis(120);

/// Value of the `--ui` flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UiMode {
    /// Spinner only when stderr is a terminal and stdout is not redirected.
    #[default]
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    /// Unknown values fall back to `Auto`.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "plain" => Self::Plain,
            "pretty" => Self::Pretty,
            _ => Self::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ui {
    spinner: bool,
}

impl Ui {
    /// A spinner is never drawn on a non-terminal stderr, even when forced.
    pub fn new(mode: UiMode, stderr_is_tty: bool, stdout_redirected: bool) -> Self {
        let spinner = stderr_is_tty
            && match mode {
                UiMode::Plain => false,
                UiMode::Pretty => true,
                UiMode::Auto => !stdout_redirected,
            };
        Self { spinner }
    }

    pub fn uses_spinner(&self) -> bool {
        self.spinner
    }

    /// Start a busy indicator for `task`; it resolves when the guard drops.
    pub fn busy(&self, task: &str) -> Busy {
        let spinner = if self.spinner {
            Some(spinner_for(task))
        } else {
            eprintln!("... {}", task);
            None
        };
        Busy {
            task: task.to_string(),
            started: Instant::now(),
            spinner,
            failed: false,
        }
    }
}

fn spinner_for(task: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(task.to_string());
    bar.enable_steady_tick(SPINNER_TICK);
    bar
}

/// Outstanding request indicator. Cleared on drop, success or not.
pub struct Busy {
    task: String,
    started: Instant,
    spinner: Option<ProgressBar>,
    failed: bool,
}

impl Busy {
    /// The request did not produce a result; the final line shows a cross.
    pub fn failed(&mut self) {
        self.failed = true;
    }

    fn summary(&self) -> String {
        let outcome = if self.failed { "✘" } else { "✔" };
        format!("{} {} in {}", outcome, self.task, elapsed(self.started.elapsed()))
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        let summary = self.summary();
        match self.spinner.take() {
            Some(bar) => bar.finish_with_message(summary),
            None => eprintln!("{}", summary),
        }
    }
}

fn elapsed(duration: Duration) -> String {
    match duration.as_millis() {
        ms @ 0..=999 => format!("{}ms", ms),
        _ => format!("{:.1}s", duration.as_secs_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_needs_a_terminal() {
        let forced = UiMode::from_flag("pretty");
        assert!(!Ui::new(forced, false, false).uses_spinner());
        assert!(Ui::new(forced, true, true).uses_spinner());
        assert!(!Ui::new(UiMode::from_flag("plain"), true, false).uses_spinner());
        assert!(!Ui::new(UiMode::Auto, true, true).uses_spinner());
        assert!(Ui::new(UiMode::from_flag("whatever"), true, false).uses_spinner());
    }

    #[test]
    fn failed_request_is_marked() {
        let ui = Ui::new(UiMode::Plain, false, false);
        let mut busy = ui.busy("Scanning door.jpg");
        assert!(busy.summary().starts_with("✔ Scanning door.jpg in "));
        busy.failed();
        assert!(busy.summary().starts_with("✘ Scanning door.jpg in "));
    }

    #[test]
    fn elapsed_switches_units() {
        assert_eq!(elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(elapsed(Duration::from_millis(1500)), "1.5s");
    }
}

//! Display formatting for CLI output
//!
//! A spinner mirrors the operation's progress messages; the final line is a
//! styled success, warning or failure marker.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Spinner showing the most recent progress message
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            bar.set_style(spinner_style);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK_INTERVAL);
        Self { bar }
    }

    /// Show a progress message from the running operation
    pub fn update(&self, message: &str) {
        tracing::debug!(message, "progress");
        self.bar.set_message(message.to_string());
    }

    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

pub fn success(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print a non-critical signal; the command still succeeds
pub fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("⚠").yellow().bold(), message);
}

pub fn action(verb: &str, kind: &str, name: &str, namespace: &str) {
    println!(
        "{} {} {} {} in namespace {}",
        style("→").blue().bold(),
        verb,
        kind,
        style(name).cyan(),
        style(namespace).yellow()
    );
}

//! Command spinner with elapsed time display
//!
//! Host operations can take minutes (SSH waits, engine installs), so every
//! one of them runs under a spinner showing how long it has been going.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A spinner for one host operation
///
/// Becomes a no-op in quiet mode, and when the template cannot be built.
pub struct CommandSpinner {
    bar: Option<ProgressBar>,
}

impl CommandSpinner {
    /// Start a spinner showing `spinner message (HH:MM:SS)`
    pub fn new(message: &str) -> Self {
        let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed_precise:.dim})")
        else {
            return Self { bar: None };
        };
        let bar = ProgressBar::new_spinner();
        bar.set_style(style.tick_chars(
            "\u{28CB}\u{2819}\u{2839}\u{2838}\u{283C}\u{2834}\u{2826}\u{2827}\u{2807}\u{280F}",
        ));
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    pub fn new_maybe(message: &str, quiet: bool) -> Self {
        if quiet {
            Self { bar: None }
        } else {
            Self::new(message)
        }
    }

    pub fn update(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Print a line above the spinner without garbling it
    pub fn println(&self, line: &str) {
        match self.bar {
            Some(ref bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    /// Finish with a green check mark
    pub fn success(self, message: &str) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!(
                "{} {}",
                console::style("\u{2713}").green(),
                message
            ));
        }
    }

    /// Finish with a red cross
    pub fn fail(self, message: &str) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!("{} {}", console::style("\u{2717}").red(), message));
        }
    }
}

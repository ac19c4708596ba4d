//! Terminal progress bar fed by the queue's download fraction.

use std::io::{self, IsTerminal};
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use netq_queue::{ProgressSink, ProgressThrottle};

/// Bar resolution: the fraction is drawn in thousandths.
const BAR_STEPS: u64 = 1000;

/// `ProgressSink` that draws the aggregate download fraction.
///
/// Only moves the bar and never blocks. Redraws are rate-limited by a
/// `ProgressThrottle`.
pub struct BarSink {
    bar: ProgressBar,
    throttle: Mutex<ProgressThrottle>,
}

impl BarSink {
    /// A bar on stderr, hidden when stderr is not a terminal or `quiet`.
    pub fn new(message: impl Into<String>, quiet: bool) -> Self {
        let target = if quiet || !io::stderr().is_terminal() {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self::with_draw_target(message, target)
    }

    pub fn with_draw_target(message: impl Into<String>, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(BAR_STEPS), target);
        bar.set_style(Self::bar_style());
        bar.set_message(message.into());
        Self {
            bar,
            throttle: Mutex::new(ProgressThrottle::default_interval()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("⇣ {msg} {bar:32.cyan/blue} {percent:>3}% [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }

    /// Print a line above the bar.
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Current bar position in thousandths.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }

    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn to_steps(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64
}

impl ProgressSink for BarSink {
    fn on_download_progress(&self, fraction: f64) {
        let due = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(fraction);
        if due {
            self.bar.set_position(to_steps(fraction));
        }
    }
}

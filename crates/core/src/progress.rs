//! Progress display for running jobs.
//!
//! The backend is polled much more often than the requester's status
//! message is refreshed. [`ProgressRatchet`] keeps the latest accepted
//! sample between refreshes and guarantees the displayed percentage never
//! goes backwards within one stage.

use std::time::Duration;

/// Number of cells in the textual progress bar.
pub const PROGRESS_BAR_LEN: u32 = 20;

/// One progress reading reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Progress {
    /// Percent complete as reported; may be out of range or regress.
    pub percent: i32,
    /// Estimated time remaining.
    pub eta: Duration,
}

/// Monotonic filter over backend progress samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressRatchet {
    percent: u32,
    eta: Duration,
}

impl ProgressRatchet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample. The percentage is accepted only when it does not
    /// regress and is clamped to `0..=100`; the ETA always follows the
    /// backend.
    ///
    /// Returns `true` when the displayed percentage changed.
    pub fn observe(&mut self, sample: Progress) -> bool {
        self.eta = sample.eta;
        let clamped = sample.percent.clamp(0, 100) as u32;
        if clamped > self.percent {
            self.percent = clamped;
            return true;
        }
        false
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }

    pub fn eta(&self) -> Duration {
        self.eta
    }
}

/// Render `percent` as a 20-cell bar followed by the numeric value, e.g.
/// `▰▰▰▰▰▱▱▱▱▱▱▱▱▱▱▱▱▱▱▱ 25%`.
pub fn progress_bar(percent: u32) -> String {
    let percent = percent.min(100);
    let filled = percent / (100 / PROGRESS_BAR_LEN);
    let mut bar = String::with_capacity(PROGRESS_BAR_LEN as usize * 3 + 5);
    for i in 0..PROGRESS_BAR_LEN {
        bar.push(if i < filled { '▰' } else { '▱' });
    }
    bar.push_str(&format!(" {percent}%"));
    bar
}

/// Format a duration rounded to whole seconds: `0s`, `12s`, `1m2s`,
/// `1h0m5s`.
pub fn format_eta(eta: Duration) -> String {
    let mut secs = eta.as_secs();
    if eta.subsec_millis() >= 500 {
        secs += 1;
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Full in-progress status text for a stage.
pub fn processing_text(ratchet: &ProgressRatchet, summary: &str) -> String {
    format!(
        "{} {} ETA: {}\n{}",
        crate::messages::PROCESSING,
        progress_bar(ratchet.percent()),
        format_eta(ratchet.eta()),
        summary
    )
}

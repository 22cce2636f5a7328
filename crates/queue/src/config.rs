//! Queue timing configuration.

use std::time::Duration;

/// Default wall-clock limit of one job, from start to terminal state.
pub const DEFAULT_MAX_JOB_DURATION: Duration = Duration::from_secs(10 * 60);
/// Default time an upscale job waits for its source image.
pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Default backend progress poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default status refresh period in one-to-one chats.
pub const DEFAULT_DIRECT_DISPLAY_INTERVAL: Duration = Duration::from_millis(500);
/// Default status refresh period in group chats.
pub const DEFAULT_GROUP_DISPLAY_INTERVAL: Duration = Duration::from_secs(3);

/// Timing knobs of the queue processor.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub max_job_duration: Duration,
    pub input_timeout: Duration,
    pub poll_interval: Duration,
    pub direct_display_interval: Duration,
    pub group_display_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_job_duration: DEFAULT_MAX_JOB_DURATION,
            input_timeout: DEFAULT_INPUT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            direct_display_interval: DEFAULT_DIRECT_DISPLAY_INTERVAL,
            group_display_interval: DEFAULT_GROUP_DISPLAY_INTERVAL,
        }
    }
}

impl QueueConfig {
    /// Status refresh period for a chat.
    pub fn display_interval(&self, group: bool) -> Duration {
        if group {
            self.group_display_interval
        } else {
            self.direct_display_interval
        }
    }
}

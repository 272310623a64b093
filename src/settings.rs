use std::time::Duration;

/// Timing and port parameters shared by the authentication flows.
///
/// The defaults suit an interactive CLI. Tests and embedders can shorten the timings or move the
/// callback ports without touching process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSettings {
    /// Deadline for the user to complete authentication, counted from the first poll or from the
    /// moment the callback listener starts waiting.
    pub auth_timeout: Duration,

    /// How often progress is reported while waiting.
    pub progress_interval: Duration,

    /// Device flow poll interval used when the provider does not advertise one.
    pub default_poll_interval: Duration,

    /// Added to the device flow poll interval on every `slow_down`.
    pub slow_down_step: Duration,

    /// Loopback port tried first for the browser flow callback.
    pub callback_port: u16,

    /// Loopback port tried if [`callback_port`](Self::callback_port) is taken.
    pub callback_fallback_port: u16,

    /// Whether the browser flow tries to open the authorization URL itself.
    pub launch_browser: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_secs(5),
            default_poll_interval: Duration::from_secs(5),
            slow_down_step: Duration::from_secs(5),
            callback_port: 8080,
            callback_fallback_port: 18088,
            launch_browser: true,
        }
    }
}

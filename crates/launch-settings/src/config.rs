use std::time::Duration;

const FILE_CHANGE_DELAY_ENV: &str = "LAUNCH_SETTINGS_FILE_CHANGE_DELAY_MS";
const FIRST_SNAPSHOT_TIMEOUT_ENV: &str = "LAUNCH_SETTINGS_FIRST_SNAPSHOT_TIMEOUT_MS";
const SAVE_DELAY_ENV: &str = "LAUNCH_SETTINGS_SAVE_DELAY_MS";
const WATCH_ENV: &str = "LAUNCH_SETTINGS_WATCH";

const MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Quiet period after the last file notification before reloading.
    pub file_change_delay: Duration,
    /// How long editing operations wait for the first snapshot.
    pub first_snapshot_timeout: Duration,
    /// Delay before a deferred save runs its checks and writes.
    pub save_delay: Duration,
    /// Whether the settings file is watched for outside edits.
    pub watch: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            file_change_delay: Duration::from_millis(500),
            first_snapshot_timeout: Duration::from_millis(5000),
            save_delay: Duration::ZERO,
            watch: true,
        }
    }
}

impl ProviderConfig {
    /// Defaults overridden by `LAUNCH_SETTINGS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            file_change_delay: duration_from_env(FILE_CHANGE_DELAY_ENV, defaults.file_change_delay),
            first_snapshot_timeout: duration_from_env(
                FIRST_SNAPSHOT_TIMEOUT_ENV,
                defaults.first_snapshot_timeout,
            ),
            save_delay: duration_from_env(SAVE_DELAY_ENV, defaults.save_delay),
            watch: parse_flag(std::env::var(WATCH_ENV).ok().as_deref(), defaults.watch),
        }
    }
}

fn duration_from_env(key: &str, default_value: Duration) -> Duration {
    let raw = std::env::var(key).ok();
    parse_delay_ms(raw.as_deref(), default_value)
}

fn parse_delay_ms(raw: Option<&str>, default_value: Duration) -> Duration {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default_value, |ms| Duration::from_millis(ms.min(MAX_DELAY_MS)))
}

fn parse_flag(raw: Option<&str>, default_value: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_parsing_falls_back_and_clamps() {
        let default = Duration::from_millis(500);
        assert_eq!(parse_delay_ms(None, default), default);
        assert_eq!(parse_delay_ms(Some(" "), default), default);
        assert_eq!(parse_delay_ms(Some("abc"), default), default);
        assert_eq!(parse_delay_ms(Some("250"), default), Duration::from_millis(250));
        assert_eq!(
            parse_delay_ms(Some("999999999"), default),
            Duration::from_millis(MAX_DELAY_MS)
        );
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag(Some("TRUE"), false));
        assert!(!parse_flag(Some("off"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }
}

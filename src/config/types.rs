use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:8086";
pub const DEFAULT_DATABASE: &str = "telemetry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            batch: BatchConfig::default(),
            http: HttpConfig::default(),
            submit: SubmitConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl WriterConfig {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_batch(mut self, max_lines: usize, max_time: Option<Duration>) -> Self {
        self.batch = BatchConfig {
            max_lines,
            max_time,
        };
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.submit.max_in_flight = max_in_flight;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.submit.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events.capacity = capacity;
        self
    }
}

/// Window closing triggers: whichever of the two fires first closes the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// `None` disables the time trigger ("infinite" in YAML).
    #[serde(default = "default_max_time", with = "duration_format")]
    pub max_time: Option<Duration>,
}

fn default_max_lines() -> usize {
    50_000
}

fn default_max_time() -> Option<Duration> {
    Some(Duration::from_millis(100))
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_time: default_max_time(),
        }
    }
}

impl BatchConfig {
    /// Every line goes out as its own batch; windowing is bypassed.
    pub fn is_unbatched(&self) -> bool {
        self.max_lines <= 1 || self.max_time == Some(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Zero means no request timeout.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_keepalive")]
    pub keepalive: bool,
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,
}

fn default_keepalive() -> bool {
    true
}

fn default_max_connections_per_host() -> usize {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            keepalive: default_keepalive(),
            max_connections_per_host: default_max_connections_per_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

// Custom serde module for optional durations ("infinite" means no limit)
mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format_duration(*d)),
            None => serializer.serialize_str("infinite"),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.trim() == "infinite" {
            Ok(None)
        } else {
            parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let (value_str, unit) = if let Some(v) = s.strip_suffix("ms") {
            (v, "ms")
        } else if let Some(v) = s.strip_suffix('s') {
            (v, "s")
        } else if let Some(v) = s.strip_suffix('m') {
            (v, "m")
        } else if let Some(v) = s.strip_suffix('h') {
            (v, "h")
        } else {
            return Err(format!("invalid duration format: {}", s));
        };

        let value: u64 = value_str
            .trim()
            .parse()
            .map_err(|_| format!("invalid numeric value: {}", value_str))?;

        let secs_per_unit = match unit {
            "ms" => return Ok(Duration::from_millis(value)),
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => return Err(format!("unknown unit: {}", unit)),
        };

        value
            .checked_mul(secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {}", s))
    }

    fn format_duration(d: Duration) -> String {
        let secs = d.as_secs();
        if d.subsec_nanos() != 0 || secs == 0 {
            format!("{}ms", d.as_millis())
        } else if secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

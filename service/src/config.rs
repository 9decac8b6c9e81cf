use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::RelaySettings;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Shared secret webhook senders must present in the `x-webhook-secret` header.
    /// When unset, inbound webhooks are accepted without a secret.
    #[arg(long, env)]
    webhook_secret: Option<String>,

    /// Seconds between heartbeat events on each SSE stream (0 disables heartbeats)
    #[arg(long, env, default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Seconds after which a connection that has not been seen is pruned
    #[arg(long, env, default_value_t = 300, value_parser = clap::value_parser!(u32).range(1..))]
    pub stale_connection_secs: u32,

    /// Number of recent events kept for replay to newly opened streams
    #[arg(long, env, default_value_t = 10)]
    pub ring_buffer_capacity: usize,

    /// Maximum age in seconds of a recent event replayed to a newly opened stream
    #[arg(long, env, default_value_t = 60, value_parser = clap::value_parser!(u32))]
    pub ring_buffer_max_age_secs: u32,

    /// Maximum number of messages held while no browser is connected
    #[arg(long, env, default_value_t = 100)]
    pub recovery_queue_capacity: usize,

    /// Seconds a message may wait in the recovery queue before it is discarded
    #[arg(long, env, default_value_t = 600, value_parser = clap::value_parser!(u32).range(1..))]
    pub recovery_queue_max_age_secs: u32,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn set_webhook_secret(mut self, webhook_secret: String) -> Self {
        self.webhook_secret = Some(webhook_secret);
        self
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    /// Relay tunables derived from the command line and environment.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            ring_buffer_capacity: self.ring_buffer_capacity,
            ring_buffer_max_age: chrono::Duration::seconds(self.ring_buffer_max_age_secs.into()),
            stale_threshold: chrono::Duration::seconds(self.stale_connection_secs.into()),
            heartbeat_interval: match self.heartbeat_interval_secs {
                0 => None,
                secs => Some(std::time::Duration::from_secs(secs)),
            },
            recovery_queue_capacity: self.recovery_queue_capacity,
            recovery_queue_max_age: chrono::Duration::seconds(self.recovery_queue_max_age_secs.into()),
        }
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_defaults() {
        let config = Config::try_parse_from(["inbox_relay"]).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.interface(), "127.0.0.1");
        assert_eq!(config.relay_settings(), RelaySettings::default());
        assert!(!config.is_production());
    }

    #[test]
    fn zero_heartbeat_interval_disables_heartbeats() {
        let config =
            Config::try_parse_from(["inbox_relay", "--heartbeat-interval-secs", "0"]).unwrap();

        assert_eq!(config.relay_settings().heartbeat_interval, None);
    }

    #[test]
    fn duration_settings_reject_negative_values() {
        for flag in [
            "--stale-connection-secs=-1",
            "--ring-buffer-max-age-secs=-1",
            "--recovery-queue-max-age-secs=-1",
        ] {
            assert!(
                Config::try_parse_from(["inbox_relay", flag]).is_err(),
                "{flag} should be rejected"
            );
        }
    }

    #[test]
    fn duration_settings_reject_out_of_range_values() {
        for flag in [
            "--stale-connection-secs=9223372036854776",
            "--ring-buffer-max-age-secs=9223372036854776",
            "--recovery-queue-max-age-secs=9223372036854776",
        ] {
            assert!(
                Config::try_parse_from(["inbox_relay", flag]).is_err(),
                "{flag} should be rejected"
            );
        }
    }

    #[test]
    fn zero_staleness_and_recovery_age_are_rejected() {
        assert!(Config::try_parse_from(["inbox_relay", "--stale-connection-secs", "0"]).is_err());
        assert!(
            Config::try_parse_from(["inbox_relay", "--recovery-queue-max-age-secs", "0"]).is_err()
        );
    }

    #[test]
    fn largest_accepted_durations_build_settings() {
        let max = u32::MAX.to_string();
        let config = Config::try_parse_from([
            "inbox_relay",
            "--stale-connection-secs",
            max.as_str(),
            "--ring-buffer-max-age-secs",
            max.as_str(),
            "--recovery-queue-max-age-secs",
            max.as_str(),
        ])
        .unwrap();

        let settings = config.relay_settings();
        assert_eq!(settings.stale_threshold.num_seconds(), i64::from(u32::MAX));
        assert_eq!(settings.ring_buffer_max_age.num_seconds(), i64::from(u32::MAX));
        assert_eq!(
            settings.recovery_queue_max_age.num_seconds(),
            i64::from(u32::MAX)
        );
    }

    #[test]
    fn runtime_env_parses_case_insensitively() {
        let config = Config::try_parse_from(["inbox_relay", "--runtime-env", "PRODUCTION"]).unwrap();

        assert_eq!(config.runtime_env(), RustEnv::Production);
        assert!(config.is_production());
        assert_eq!("Staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn allowed_origins_split_on_commas() {
        let config = Config::try_parse_from([
            "inbox_relay",
            "--allowed-origins",
            "https://inbox.example.com,https://admin.example.com",
        ])
        .unwrap();

        assert_eq!(
            config.allowed_origins,
            vec!["https://inbox.example.com", "https://admin.example.com"]
        );
    }
}

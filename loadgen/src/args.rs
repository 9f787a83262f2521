use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pg_session::{Endpoint, ErrorMode, SessionConfig};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load generator for pg-session")]
pub(crate) struct Args {
    #[arg(long, env = "PG_HOST", default_value = "localhost")]
    pub(crate) host: String,
    #[arg(long, env = "PG_PORT", default_value_t = 5000)]
    pub(crate) port: u16,
    #[arg(long, env = "PG_DATABASE", default_value = "db")]
    pub(crate) database: String,
    #[arg(long, env = "PG_USER", default_value = "user")]
    pub(crate) user: String,
    #[arg(
        long,
        env = "PG_PASSWORD",
        default_value = "pass",
        hide_env_values = true
    )]
    pub(crate) password: String,
    /// Simulated users, each with its own session.
    #[arg(long, default_value_t = 10)]
    pub(crate) users: usize,
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    /// Tasks per user.
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Upper bound on the random pause between a user's tasks.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) think_time: Option<Duration>,
    #[arg(long, default_value_t = 3)]
    pub(crate) retry_limit: u32,
    #[arg(long, default_value_t = 1)]
    pub(crate) retry_backoff_secs: u64,
    #[arg(long, default_value_t = 3)]
    pub(crate) connect_timeout_secs: u64,
    #[arg(long)]
    pub(crate) no_reconnect: bool,
    #[arg(long, value_enum, default_value = "outcome")]
    pub(crate) error_mode: ErrorMode,
    /// Insert a few users, orders and items before the run.
    #[arg(long)]
    pub(crate) seed_data: bool,
    /// File receiving ERROR-level log lines.
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoadConfig {
    pub(crate) session: SessionConfig,
    pub(crate) users: usize,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) think_time_ms: u64,
    pub(crate) seed_data: bool,
    pub(crate) log: Option<PathBuf>,
}

impl LoadConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let endpoint = Endpoint::new(
            args.host,
            args.port,
            args.database,
            args.user,
            args.password,
        );
        let session = SessionConfig::new(endpoint)
            .with_reconnect(!args.no_reconnect)
            .with_retry_limit(args.retry_limit)
            .with_retry_backoff_secs(args.retry_backoff_secs)
            .with_connect_timeout_secs(args.connect_timeout_secs)
            .with_error_mode(args.error_mode)
            .with_application_name("loadgen");

        let mut config = LoadConfig {
            session,
            users: args.users.max(1),
            duration_ms: args.duration.map(|d| d.as_millis() as u64),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            think_time_ms: args.think_time.map_or(0, |d| d.as_millis() as u64),
            seed_data: args.seed_data,
            log: args.log,
        };
        // without either bound a run would never end
        if config.duration_ms.is_none() && config.iterations.is_none() {
            config.iterations = Some(100);
        }
        config
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs() ^ (now.subsec_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_environment_conventions() {
        let args = Args::parse_from(["loadgen", "--users", "0"]);
        let config = LoadConfig::from_args(args);
        assert_eq!(config.users, 1);
        assert_eq!(config.iterations, Some(100));
        assert_eq!(config.session.retry_limit, 3);
        assert!(config.session.reconnect_enabled);
        assert_eq!(config.session.application_name.as_deref(), Some("loadgen"));
    }

    #[test]
    fn flags_map_onto_session_config() {
        let args = Args::parse_from([
            "loadgen",
            "--host",
            "db.internal",
            "--port",
            "5432",
            "--no-reconnect",
            "--error-mode",
            "raise",
            "--duration",
            "2s",
        ]);
        let config = LoadConfig::from_args(args);
        assert_eq!(config.session.endpoint.label(), "db.internal:5432/db");
        assert!(!config.session.reconnect_enabled);
        assert_eq!(config.session.error_mode, ErrorMode::Raise);
        assert_eq!(config.duration_ms, Some(2000));
        assert_eq!(config.iterations, None);
    }
}

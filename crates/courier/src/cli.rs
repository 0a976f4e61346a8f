//! Command-line flags. Every flag is optional and, when given, wins over
//! the settings file and the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use courier_settings::{
    DeliveryMode, GateMode, RelaySettings, TransportSettings, parse_duration,
};

/// Courier real-time message relay.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Courier real-time message relay", version)]
pub struct Cli {
    /// Address to listen on (`host:port`).
    #[arg(short, long)]
    pub listen: Option<String>,

    /// WebSocket read buffer size in bytes.
    #[arg(short, long)]
    pub read_buffer: Option<usize>,

    /// WebSocket write buffer size in bytes.
    #[arg(short, long)]
    pub write_buffer: Option<usize>,

    /// Read/write deadline and keepalive threshold, in seconds.
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u64).range(1..=TransportSettings::MAX_TIMEOUT_SECS)
    )]
    pub timeout: Option<u64>,

    /// Offline cache TTL (`500ms`, `5s`, `2m`, `1h`).
    #[arg(short, long, value_parser = parse_duration)]
    pub cache: Option<Duration>,

    /// Log level (`ERROR`, `INFO`, `DEBUG`).
    #[arg(short, long)]
    pub verbose: Option<String>,

    /// Path to a JSON settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Delivery mode when a session falls behind: `blocking` or `drop`.
    #[arg(long)]
    pub delivery: Option<DeliveryMode>,

    /// Serialization gate scope: `global` or `scoped`.
    #[arg(long)]
    pub gate: Option<GateMode>,
}

impl Cli {
    /// Overlay the flags that were given onto `settings`.
    pub fn apply(&self, settings: &mut RelaySettings) {
        if let Some(listen) = &self.listen {
            settings.server.listen.clone_from(listen);
        }
        if let Some(size) = self.read_buffer {
            settings.transport.read_buffer_size = size;
        }
        if let Some(size) = self.write_buffer {
            settings.transport.write_buffer_size = size;
        }
        if let Some(secs) = self.timeout {
            settings.transport.timeout_secs = secs;
        }
        if let Some(ttl) = self.cache {
            settings.cache.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        }
        if let Some(level) = &self.verbose {
            settings.logging.level.clone_from(level);
        }
        if let Some(mode) = self.delivery {
            settings.delivery.mode = mode;
        }
        if let Some(mode) = self.gate {
            settings.gate.mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("courier").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_leaves_settings_alone() {
        let mut settings = RelaySettings::default();
        parse(&[]).apply(&mut settings);
        assert_eq!(settings.server.listen, "0.0.0.0:3498");
        assert_eq!(settings.cache.ttl_ms, 5_000);
        assert_eq!(settings.logging.level, "ERROR");
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = RelaySettings::default();
        parse(&[
            "--listen",
            "127.0.0.1:8080",
            "--read-buffer",
            "1024",
            "--write-buffer",
            "2048",
            "--timeout",
            "10",
            "--cache",
            "2m",
            "--verbose",
            "DEBUG",
            "--delivery",
            "drop",
            "--gate",
            "global",
        ])
        .apply(&mut settings);

        assert_eq!(settings.server.listen, "127.0.0.1:8080");
        assert_eq!(settings.transport.read_buffer_size, 1024);
        assert_eq!(settings.transport.write_buffer_size, 2048);
        assert_eq!(settings.transport.timeout_secs, 10);
        assert_eq!(settings.cache.ttl_ms, 120_000);
        assert_eq!(settings.logging.level, "DEBUG");
        assert_eq!(settings.delivery.mode, DeliveryMode::Drop);
        assert_eq!(settings.gate.mode, GateMode::Global);
    }

    #[test]
    fn cache_accepts_milliseconds() {
        let mut settings = RelaySettings::default();
        parse(&["--cache", "500ms"]).apply(&mut settings);
        assert_eq!(settings.cache.ttl_ms, 500);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            vec!["--timeout", "0"],
            vec!["--timeout", "86401"],
            vec!["--timeout", "18446744073709551615"],
            vec!["--cache", "99999999999999999999h"],
            vec!["--cache", "soon"],
            vec!["--delivery", "maybe"],
            vec!["--gate", "local"],
            vec!["--read-buffer", "-1"],
        ];
        for args in bad {
            let argv = std::iter::once("courier").chain(args.iter().copied());
            assert!(Cli::try_parse_from(argv).is_err(), "{args:?} should fail");
        }
    }

    #[test]
    fn short_flags_match_long_ones() {
        let mut settings = RelaySettings::default();
        parse(&[
            "-l", "127.0.0.1:7000", "-r", "100", "-w", "200", "-t", "5", "-c", "10s", "-v",
            "INFO",
        ])
        .apply(&mut settings);

        assert_eq!(settings.server.listen, "127.0.0.1:7000");
        assert_eq!(settings.transport.read_buffer_size, 100);
        assert_eq!(settings.transport.write_buffer_size, 200);
        assert_eq!(settings.transport.timeout_secs, 5);
        assert_eq!(settings.cache.ttl_ms, 10_000);
        assert_eq!(settings.logging.level, "INFO");
    }

    #[test]
    fn timeout_upper_bound_is_accepted() {
        let mut settings = RelaySettings::default();
        parse(&["--timeout", "86400"]).apply(&mut settings);
        assert_eq!(settings.transport.timeout_secs, 86_400);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn config_path_is_captured() {
        let cli = parse(&["--config", "/etc/courier.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/courier.json")));
    }
}

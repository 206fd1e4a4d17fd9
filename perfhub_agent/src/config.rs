//! Agent configuration: CLI flags for the listener, environment variables for
//! tuning knobs.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 7079;
pub const USAGE: &str = "Usage: perfhub_agent [--port PORT|-p PORT] [--enableSSL]\n\
Environment: PERFHUB_ENABLE_SSL, PERFHUB_TICK_MS, PERFHUB_SUMMARY_EVERY, \
PERFHUB_QUEUE_CAPACITY, PERFHUB_LONGPOLL_HOLD_MS, PERFHUB_SESSION_IDLE_MS, RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub port: u16,
    pub enable_ssl: bool,
    pub tick: Duration,
    /// Emit the diagnostic summary every N ticks (0 disables it).
    pub summary_every: u64,
    pub queue_capacity: usize,
    pub long_poll_hold: Duration,
    pub session_idle: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            enable_ssl: false,
            tick: Duration::from_secs(1),
            summary_every: 10,
            queue_capacity: 16,
            long_poll_hold: Duration::from_secs(20),
            session_idle: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(AgentConfig),
    Help,
}

impl AgentConfig {
    pub fn from_env_and_args() -> Result<Command, ConfigError> {
        Self::parse(std::env::args(), |k| std::env::var(k).ok())
    }

    pub fn parse<I, F>(args: I, env: F) -> Result<Command, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AgentConfig::default();

        if let Some(v) = env("PERFHUB_ENABLE_SSL") {
            cfg.enable_ssl = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Some(v) = env("PERFHUB_TICK_MS") {
            cfg.tick = Duration::from_millis(positive("PERFHUB_TICK_MS", &v)?);
        }
        if let Some(v) = env("PERFHUB_SUMMARY_EVERY") {
            cfg.summary_every = v.parse().map_err(|_| invalid("PERFHUB_SUMMARY_EVERY", &v))?;
        }
        if let Some(v) = env("PERFHUB_QUEUE_CAPACITY") {
            cfg.queue_capacity = positive("PERFHUB_QUEUE_CAPACITY", &v)? as usize;
        }
        if let Some(v) = env("PERFHUB_LONGPOLL_HOLD_MS") {
            cfg.long_poll_hold = Duration::from_millis(positive("PERFHUB_LONGPOLL_HOLD_MS", &v)?);
        }
        if let Some(v) = env("PERFHUB_SESSION_IDLE_MS") {
            cfg.session_idle = Duration::from_millis(positive("PERFHUB_SESSION_IDLE_MS", &v)?);
        }

        let mut it = args.into_iter();
        let _ = it.next(); // program name
        while let Some(a) = it.next() {
            match a.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "--port" | "-p" => {
                    let v = it.next().ok_or(ConfigError::Missing("--port"))?;
                    cfg.port = port(&v)?;
                }
                "--enableSSL" => cfg.enable_ssl = true,
                _ if a.starts_with("--port=") => {
                    if let Some((_, v)) = a.split_once('=') {
                        cfg.port = port(v)?;
                    }
                }
                _ => return Err(ConfigError::Unexpected(a)),
            }
        }
        Ok(Command::Run(cfg))
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn port(v: &str) -> Result<u16, ConfigError> {
    v.parse::<u16>().map_err(|_| invalid("--port", v))
}

fn positive(name: &'static str, v: &str) -> Result<u64, ConfigError> {
    match v.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(name, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("perfhub_agent")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    fn run(v: &[&str]) -> AgentConfig {
        match AgentConfig::parse(args(v), |_| None).unwrap() {
            Command::Run(c) => c,
            Command::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(run(&["--port", "9001"]).port, 9001);
        assert_eq!(run(&["-p", "9002"]).port, 9002);
        assert_eq!(run(&["--port=9003"]).port, 9003);
        assert_eq!(run(&[]).port, DEFAULT_PORT);
    }

    #[test]
    fn bad_port_and_unknown_flags_are_rejected() {
        assert!(AgentConfig::parse(args(&["--port", "http"]), |_| None).is_err());
        assert_eq!(
            AgentConfig::parse(args(&["--port"]), |_| None),
            Err(ConfigError::Missing("--port"))
        );
        assert_eq!(
            AgentConfig::parse(args(&["--verbose"]), |_| None),
            Err(ConfigError::Unexpected("--verbose".into()))
        );
    }

    #[test]
    fn help_short_circuits() {
        assert_eq!(
            AgentConfig::parse(args(&["-p", "1", "--help"]), |_| None),
            Ok(Command::Help)
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("PERFHUB_ENABLE_SSL", "1"),
            ("PERFHUB_TICK_MS", "250"),
            ("PERFHUB_SUMMARY_EVERY", "0"),
            ("PERFHUB_QUEUE_CAPACITY", "4"),
            ("PERFHUB_LONGPOLL_HOLD_MS", "1500"),
            ("PERFHUB_SESSION_IDLE_MS", "9000"),
        ]
        .into_iter()
        .collect();
        let cmd = AgentConfig::parse(args(&[]), |k| env.get(k).map(|v| v.to_string())).unwrap();
        let Command::Run(cfg) = cmd else {
            panic!("expected run");
        };
        assert!(cfg.enable_ssl);
        assert_eq!(cfg.tick, Duration::from_millis(250));
        assert_eq!(cfg.summary_every, 0);
        assert_eq!(cfg.queue_capacity, 4);
        assert_eq!(cfg.long_poll_hold, Duration::from_millis(1500));
        assert_eq!(cfg.session_idle, Duration::from_secs(9));
    }

    #[test]
    fn zero_tick_is_invalid() {
        let err = AgentConfig::parse(args(&[]), |k| {
            (k == "PERFHUB_TICK_MS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "PERFHUB_TICK_MS",
                ..
            }
        ));
    }
}

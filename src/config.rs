// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Hearts a candidate starts every session with.
pub const START_HEARTS: u32 = 3;

/// Time allowed to restore fullscreen before the session is abandoned.
pub const GRACE_WINDOW_MS: u64 = 3000;

/// Period of the enforcement tick that re-requests fullscreen.
pub const ENFORCEMENT_POLL_MS: u64 = 500;

/// Default pass threshold, as a percentage of the 100 point maximum.
pub const MIN_PASS_SCORE: i32 = 60;

/// Fixed maximum score of every exam.
pub const MAX_SCORE: i32 = 100;

/// Upper bound on questions per session.
pub const MAX_EXAM_QUESTIONS: i32 = 20;

const DEFAULT_EXAM_DURATION_SECONDS: u64 = 3 * 60 * 60;
const DEFAULT_SUBMIT_UNLOCK_SECONDS: u64 = 90 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub exam: ExamConfig,
}

/// Exam-level rules applied by the session coordinator.
#[derive(Debug, Clone)]
pub struct ExamConfig {
    pub min_pass_score: i32,
    pub duration: Duration,
    /// Manual submits are refused until this much time has been spent.
    pub submit_unlock: Duration,
    pub monitor: MonitorConfig,
}

/// Timing and budget constants of the integrity monitor.
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub start_hearts: u32,
    pub grace_window: Duration,
    pub enforcement_poll: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            start_hearts: START_HEARTS,
            grace_window: Duration::from_millis(GRACE_WINDOW_MS),
            enforcement_poll: Duration::from_millis(ENFORCEMENT_POLL_MS),
        }
    }
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            min_pass_score: MIN_PASS_SCORE,
            duration: Duration::from_secs(DEFAULT_EXAM_DURATION_SECONDS),
            submit_unlock: Duration::from_secs(DEFAULT_SUBMIT_UNLOCK_SECONDS),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Config {
    /// Reads the environment. Call after the tracing subscriber is installed,
    /// so fallback warnings are not lost.
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let exam = ExamConfig {
            min_pass_score: parse_var("EXAM_MIN_PASS_SCORE", MIN_PASS_SCORE),
            duration: Duration::from_secs(parse_var(
                "EXAM_DURATION_SECONDS",
                DEFAULT_EXAM_DURATION_SECONDS,
            )),
            submit_unlock: Duration::from_secs(parse_var(
                "EXAM_SUBMIT_UNLOCK_SECONDS",
                DEFAULT_SUBMIT_UNLOCK_SECONDS,
            )),
            monitor: MonitorConfig::default(),
        };

        Self {
            database_url,
            jwt_secret,
            bind_addr,
            exam,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    parse_or(key, env::var(key).ok(), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_or_reads_value() {
        assert_eq!(parse_or("EXAM_MIN_PASS_SCORE", Some("75".to_string()), 60), 75);
        assert_eq!(parse_or("EXAM_MIN_PASS_SCORE", None, 60), 60);
    }

    #[test]
    fn test_unparsable_value_warns_and_falls_back() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let value = tracing::subscriber::with_default(subscriber, || {
            parse_or("EXAM_DURATION_SECONDS", Some("three hours".to_string()), 10_800u64)
        });
        assert_eq!(value, 10_800);

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("EXAM_DURATION_SECONDS"));
    }
}

use anyhow::{Context, Result};
use std::env;

#[derive(Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub port: u16,
    /// Fully qualified name of the worker task to dispatch.
    pub worker_task: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "redis".to_string());

        let redis_port = env::var("REDIS_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse::<u16>()
            .context("REDIS_PORT must be a valid port number")?;

        let redis_password = parse_optional(env::var("REDIS_PASSWORD").ok());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let worker_task =
            env::var("WORKER_TASK").unwrap_or_else(|_| "worker.process_file".to_string());

        Ok(Config {
            redis_host,
            redis_port,
            redis_password,
            port,
            worker_task,
        })
    }

    /// Connection URL for the Redis broker/result backend.
    pub fn redis_url(&self) -> String {
        build_redis_url(
            &self.redis_host,
            self.redis_port,
            self.redis_password.as_deref(),
        )
    }
}

/// Treat missing, empty, or whitespace-only values as unset.
fn parse_optional(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn build_redis_url(host: &str, port: u16, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("redis://:{}@{}:{}/", password, host, port),
        None => format!("redis://{}:{}/", host, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_none() {
        assert_eq!(parse_optional(None), None);
    }

    #[test]
    fn test_parse_optional_empty_or_whitespace() {
        assert_eq!(parse_optional(Some("".to_string())), None);
        assert_eq!(parse_optional(Some("   ".to_string())), None);
        assert_eq!(parse_optional(Some("\t\n".to_string())), None);
    }

    #[test]
    fn test_parse_optional_valid() {
        assert_eq!(
            parse_optional(Some("hunter2".to_string())),
            Some("hunter2".to_string())
        );
    }

    #[test]
    fn test_redis_url_without_password() {
        assert_eq!(build_redis_url("redis", 6379, None), "redis://redis:6379/");
    }

    #[test]
    fn test_redis_url_with_password() {
        assert_eq!(
            build_redis_url("10.0.0.5", 6380, Some("hunter2")),
            "redis://:hunter2@10.0.0.5:6380/"
        );
    }
}

//! Command line and environment configuration.
//!
//! Any `--key value` (or bare `--flag`) the parser does not know is treated as an extra claim for
//! the signing payload, so deployments can scope tokens without a JSON blob in the environment.

use anyhow::Context as _;
use clap::{Command, CommandFactory as _, Parser};
use cube_mcp_client::config::parse_token_payload;
use cube_mcp_client::{CubeConfig, RetentionPolicy, RetryPolicy};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cube-mcp-server", version, about = "MCP server for a Cube semantic layer")]
pub struct Cli {
    /// Base URL of the Cube REST API, e.g. `https://cube.example/cubejs-api/v1`
    #[arg(long, env = "CUBE_ENDPOINT")]
    pub endpoint: String,

    /// Signing secret, or a pre-generated JWT
    #[arg(long, alias = "api_secret", env = "CUBE_API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    /// JSON object merged into every signed token
    #[arg(
        long,
        alias = "token_payload",
        env = "CUBE_TOKEN_PAYLOAD",
        default_value = "{}",
        hide_env_values = true
    )]
    pub token_payload: String,

    /// Log level (overridden by `RUST_LOG`)
    #[arg(long, alias = "log_level", default_value = "info")]
    pub log_level: String,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, alias = "log_dir")]
    pub log_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Upper bound on time spent polling a query that is still running
    #[arg(long, default_value_t = 10)]
    pub max_wait_secs: u64,

    #[arg(long, default_value_t = 1000)]
    pub backoff_millis: u64,

    /// Maximum number of query results kept for `data://` retrieval
    #[arg(long, default_value_t = RetentionPolicy::DEFAULT_CAPACITY)]
    pub resource_capacity: usize,

    /// Forget query results older than this (unset: keep until evicted)
    #[arg(long)]
    pub resource_ttl_secs: Option<u64>,

    /// Claims collected from unrecognised `--key value` arguments.
    #[arg(skip)]
    pub extra_claims: Map<String, Value>,
}

impl Cli {
    /// Parse process arguments, exiting with clap's usage output on error.
    #[must_use]
    pub fn parse_with_extras() -> Self {
        let args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
        Self::try_parse_with_extras(args).unwrap_or_else(|e| e.exit())
    }

    /// # Errors
    ///
    /// Returns clap's error for missing or malformed known arguments.
    pub fn try_parse_with_extras<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let (known, extras) = split_extra_args(&Self::command(), args);
        let mut cli = Self::try_parse_from(known)?;
        cli.extra_claims = extras;
        Ok(cli)
    }

    /// Connection settings; extra claims override keys from `--token-payload`.
    ///
    /// # Errors
    ///
    /// Fails if the token payload is not a JSON object.
    pub fn cube_config(&self) -> anyhow::Result<CubeConfig> {
        let mut payload =
            parse_token_payload(&self.token_payload).context("invalid CUBE_TOKEN_PAYLOAD")?;
        payload.extend(self.extra_claims.clone());
        Ok(CubeConfig::new(&self.endpoint, &self.api_secret).with_token_payload(payload))
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.backoff_millis),
            max_wait: Duration::from_secs(self.max_wait_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            capacity: self.resource_capacity,
            ttl: self.resource_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// Split `args` into what clap should parse and the unknown `--key [value]` pairs.
fn split_extra_args(cmd: &Command, args: Vec<String>) -> (Vec<String>, Map<String, Value>) {
    let mut known = Vec::with_capacity(args.len());
    let mut extras = Map::new();
    let mut iter = args.into_iter().peekable();

    // argv[0]
    if let Some(bin) = iter.next() {
        known.push(bin);
    }

    while let Some(arg) = iter.next() {
        let Some(flag) = arg.strip_prefix("--").filter(|f| !f.is_empty()) else {
            known.push(arg);
            continue;
        };
        let (name, inline) = match flag.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (flag.to_string(), None),
        };

        if let Some(takes_value) = known_flag(cmd, &name) {
            known.push(arg);
            if takes_value
                && inline.is_none()
                && let Some(value) = iter.next()
            {
                known.push(value);
            }
            continue;
        }

        let value = match inline {
            Some(v) => Value::String(v),
            None => match iter.next_if(|next| !next.starts_with("--")) {
                Some(v) => Value::String(v),
                None => Value::Bool(true),
            },
        };
        extras.insert(name, value);
    }

    (known, extras)
}

/// `Some(takes_value)` if `name` is a long flag or alias the command defines.
fn known_flag(cmd: &Command, name: &str) -> Option<bool> {
    if name == "help" || name == "version" {
        return Some(false);
    }
    cmd.get_arguments()
        .find(|a| {
            a.get_long() == Some(name)
                || a.get_all_aliases()
                    .is_some_and(|aliases| aliases.contains(&name))
        })
        .map(|a| a.get_action().takes_values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cube-mcp-server"];
        argv.extend_from_slice(args);
        Cli::try_parse_with_extras(argv).expect("parse")
    }

    #[test]
    fn defaults_match_documented_policy() {
        let cli = parse(&["--endpoint", "http://localhost:4000/cubejs-api/v1", "--api-secret", "s"]);
        assert_eq!(cli.retry_policy(), RetryPolicy::default());
        assert_eq!(cli.retention(), RetentionPolicy::default());
        assert_eq!(cli.log_level, "info");
        assert!(cli.extra_claims.is_empty());
    }

    #[test]
    fn unknown_flags_become_claims() {
        let cli = parse(&[
            "--endpoint",
            "http://localhost:4000",
            "--user_id",
            "42",
            "--api-secret",
            "s",
            "--admin",
            "--tenant=acme",
        ]);
        assert_eq!(cli.api_secret, "s");
        assert_eq!(cli.extra_claims.get("user_id"), Some(&json!("42")));
        assert_eq!(cli.extra_claims.get("admin"), Some(&json!(true)));
        assert_eq!(cli.extra_claims.get("tenant"), Some(&json!("acme")));
    }

    #[test]
    fn trailing_flag_without_value_is_true() {
        let cli = parse(&["--endpoint", "http://x", "--api-secret", "s", "--debug_claims"]);
        assert_eq!(cli.extra_claims.get("debug_claims"), Some(&json!(true)));
    }

    #[test]
    fn underscore_aliases_are_accepted() {
        let cli = parse(&[
            "--endpoint",
            "http://x",
            "--api_secret",
            "s",
            "--log_level",
            "debug",
            "--log_dir",
            "/tmp/logs",
        ]);
        assert_eq!(cli.api_secret, "s");
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(cli.extra_claims.is_empty());
    }

    #[test]
    fn extra_claims_override_payload_keys() {
        let cli = parse(&[
            "--endpoint",
            "http://x",
            "--api-secret",
            "s",
            "--token-payload",
            r#"{"user_id": "1", "role": "viewer"}"#,
            "--user_id",
            "2",
        ]);
        let cfg = cli.cube_config().expect("config");
        assert_eq!(cfg.token_payload.get("user_id"), Some(&json!("2")));
        assert_eq!(cfg.token_payload.get("role"), Some(&json!("viewer")));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let cli = parse(&["--endpoint", "http://x", "--api-secret", "s", "--token-payload", "[1]"]);
        assert!(cli.cube_config().is_err());
    }

    #[test]
    fn tuning_flags_map_to_policies() {
        let cli = parse(&[
            "--endpoint",
            "http://x",
            "--api-secret",
            "s",
            "--backoff-millis",
            "250",
            "--max-wait-secs",
            "3",
            "--resource-capacity",
            "10",
            "--resource-ttl-secs",
            "60",
        ]);
        assert_eq!(cli.retry_policy().backoff, Duration::from_millis(250));
        assert_eq!(cli.retry_policy().max_wait, Duration::from_secs(3));
        assert_eq!(cli.retention().capacity, 10);
        assert_eq!(cli.retention().ttl, Some(Duration::from_secs(60)));
    }
}

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use agora_store::TreeStore;
use agora_sync::compose::CommentOrder;
use agora_sync::{CounterStrategy, LikePolicy, OptimisticMutator, RetryPolicy, WriteFailurePolicy};

/// Runtime configuration, read from `AGORA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub like_policy: LikePolicy,
    pub like_counter: CounterStrategy,
    pub write_failure: WriteFailurePolicy,
    pub comment_order: CommentOrder,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "agora.db".into(),
            like_policy: LikePolicy::default(),
            like_counter: CounterStrategy::default(),
            write_failure: WriteFailurePolicy::default(),
            comment_order: CommentOrder::default(),
            retry: RetryPolicy::none(),
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {key}={raw}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let attempts: u32 = parse(&lookup, "AGORA_RETRY_ATTEMPTS", 0)?;
        let base_ms: u64 = parse(&lookup, "AGORA_RETRY_BASE_MS", 250)?;
        let retry = if attempts == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::exponential(attempts, Duration::from_millis(base_ms))
        };

        let config = Self {
            db_path: lookup("AGORA_DB_PATH").unwrap_or(defaults.db_path),
            like_policy: parse(&lookup, "AGORA_LIKE_POLICY", defaults.like_policy)?,
            like_counter: parse(&lookup, "AGORA_LIKE_COUNTER", defaults.like_counter)?,
            write_failure: parse(&lookup, "AGORA_WRITE_FAILURE", defaults.write_failure)?,
            comment_order: parse(&lookup, "AGORA_COMMENT_ORDER", defaults.comment_order)?,
            retry,
        };

        info!(
            "Config: db={} likes={:?}/{:?} on_failure={:?} comments={:?} retries={}",
            config.db_path,
            config.like_policy,
            config.like_counter,
            config.write_failure,
            config.comment_order,
            config.retry.max_attempts
        );
        Ok(config)
    }

    /// A mutator wired with this configuration's policies.
    pub fn mutator<S: TreeStore>(&self, store: S) -> OptimisticMutator<S> {
        OptimisticMutator::new(store)
            .with_counter(self.like_counter)
            .with_like_policy(self.like_policy)
            .with_failure_policy(self.write_failure)
    }
}

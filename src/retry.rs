use crate::config::RetrySettings;
use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5), // Default values - overridden by TOML config in production
            max_delay: Duration::from_secs(300), // Default values - overridden by TOML config in production
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential_delay =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_seconds = exponential_delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay_seconds)
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.base_delay_seconds),
            Duration::from_secs(settings.max_delay_seconds),
            settings.backoff_multiplier,
        )
    }
}

pub async fn execute_with_retry<F, Fut, T, E>(
    operation: F,
    retry_config: &RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>> + Send,
    E: std::fmt::Display + Send + Sync + 'static,
{
    let mut last_error = None;

    for attempt in 1..=retry_config.max_attempts {
        info!(
            "🔄 {} attempt {}/{}",
            operation_name, attempt, retry_config.max_attempts
        );

        match operation().await {
            Ok(result) => {
                info!("✅ {} succeeded on attempt {}", operation_name, attempt);
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "❌ {} failed on attempt {}", operation_name, attempt
                );
                last_error = Some(e);

                if attempt < retry_config.max_attempts {
                    let delay = retry_config.delay_for(attempt);
                    info!("⏳ Waiting {:?} before retry...", delay);
                    sleep(delay).await;
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(anyhow::anyhow!(
            "{} failed after {} attempts. Last error: {}",
            operation_name,
            retry_config.max_attempts,
            e
        )),
        None => Err(anyhow::anyhow!(
            "{} was not attempted (max_attempts = 0)",
            operation_name
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let config = RetryConfig::default();
        let call_count = AtomicU32::new(0);

        let result = execute_with_retry(
            || {
                let count = call_count.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Ok("success")
                    } else {
                        Err("unexpected call")
                    }
                }
            },
            &config,
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_on_second_attempt() {
        let config = RetryConfig::new(3, Duration::from_millis(10), Duration::from_secs(1), 2.0);
        let call_count = AtomicU32::new(0);

        let result = execute_with_retry(
            || {
                let count = call_count.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err("first attempt fails")
                    } else {
                        Ok("success")
                    }
                }
            },
            &config,
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_failure_after_max_attempts() {
        let config = RetryConfig::new(2, Duration::from_millis(10), Duration::from_secs(1), 2.0);
        let call_count = AtomicU32::new(0);

        let result = execute_with_retry(
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async move { Err::<&str, anyhow::Error>(anyhow::anyhow!("always fails")) }
            },
            &config,
            "test_operation",
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("always fails"));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let config = RetryConfig::new(5, Duration::from_secs(5), Duration::from_secs(30), 2.0);
        assert_eq!(config.delay_for(1), Duration::from_secs(5));
        assert_eq!(config.delay_for(2), Duration::from_secs(10));
        assert_eq!(config.delay_for(3), Duration::from_secs(20));
        assert_eq!(config.delay_for(4), Duration::from_secs(30));
        assert_eq!(config.delay_for(50), Duration::from_secs(30));
    }
}

use sqlx::{Error as SqlxError, PgPool, Postgres, Transaction};
use tokio::time::{Duration, sleep};

pub struct AcquireRetry;

impl AcquireRetry {
    /// Begins a transaction, retrying with exponential backoff while the pool is exhausted.
    pub async fn begin_with_retry(
        pool: &PgPool,
        attempts: usize,
        base_backoff_ms: u64,
    ) -> Result<Transaction<'_, Postgres>, SqlxError> {
        let mut tries = 0;
        loop {
            match pool.begin().await {
                Ok(tx) => return Ok(tx),
                Err(e) => {
                    if is_pool_timeout(&e) && tries + 1 < attempts {
                        let backoff = backoff_ms(base_backoff_ms, tries);
                        log::warn!(
                            "begin() PoolTimedOut; retrying (attempt={}, backoff_ms={})",
                            tries + 1,
                            backoff
                        );
                        sleep(Duration::from_millis(backoff)).await;
                        tries += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn is_pool_timeout(error: &SqlxError) -> bool {
    matches!(error, SqlxError::PoolTimedOut) || error.to_string().to_lowercase().contains("timed out")
}

fn backoff_ms(base_backoff_ms: u64, tries: usize) -> u64 {
    base_backoff_ms.saturating_mul(1u64 << tries.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(50, 0), 50);
        assert_eq!(backoff_ms(50, 1), 100);
        assert_eq!(backoff_ms(50, 3), 400);
    }

    #[test]
    fn test_pool_timeout_is_detected() {
        assert!(is_pool_timeout(&SqlxError::PoolTimedOut));
        assert!(!is_pool_timeout(&SqlxError::RowNotFound));
    }
}

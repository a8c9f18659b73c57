use blockfeed_client::ClientError;

use std::time::Duration;

/// A fixed-delay retry policy for fallible node fetches.
#[derive(Debug, Clone)]
pub struct Retry {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self { max_retries: 5, delay: Duration::from_millis(500) }
    }
}

impl Retry {
    /// Returns a new retry policy with the given parameters.
    pub const fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Runs `operation`, retrying errors accepted by `is_retryable` up to the
    /// configured number of times.
    pub async fn retry<F, Fut, T>(
        &self,
        operation_name: &str,
        is_retryable: impl Fn(&ClientError) -> bool,
        operation: F,
    ) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: usize = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        target: "blockfeed::listener",
                        operation = operation_name,
                        %err,
                        attempt,
                        "retrying operation"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Retry;
    use blockfeed_client::ClientError;
    use std::{cell::RefCell, time::Duration};

    fn retryable(_: &ClientError) -> bool {
        true
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let attempt = RefCell::new(0);
        let retry = Retry::new(3, Duration::from_millis(1));
        let result = retry
            .retry("test_operation", retryable, || {
                *attempt.borrow_mut() += 1;
                async move { Ok::<i32, ClientError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let attempt = RefCell::new(0);
        let retry = Retry::new(5, Duration::from_millis(1));
        let result = retry
            .retry("test_operation", retryable, || {
                *attempt.borrow_mut() += 1;
                let current = *attempt.borrow();
                async move {
                    if current < 3 {
                        Err(ClientError::NotFound("0xaa".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let attempt = RefCell::new(0);
        let retry = Retry::new(2, Duration::from_millis(1));
        let result = retry
            .retry("test_operation", retryable, || {
                *attempt.borrow_mut() += 1;
                async move { Err::<i32, _>(ClientError::NotFound("0xaa".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt.borrow(), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_immediate() {
        let attempt = RefCell::new(0);
        let retry = Retry::new(5, Duration::from_millis(1));
        let result = retry
            .retry("test_operation", |err| matches!(err, ClientError::NotFound(_)), || {
                *attempt.borrow_mut() += 1;
                async move { Err::<i32, _>(ClientError::SubscriptionClosed) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt.borrow(), 1);
    }
}

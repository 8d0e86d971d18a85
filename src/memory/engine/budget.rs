//! Time budgets for external calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::memory::core::errors::{ErrorKind, MemoryError, MemoryResult};

/// Run `fut` under `budget`, mapping expiry to a `Timeout` in `category`.
///
/// # Errors
/// Returns the inner error, or `Timeout` if the budget runs out first.
pub async fn bounded<T, F>(
    operation: &'static str,
    category: ErrorKind,
    budget: Duration,
    fut: F,
) -> MemoryResult<T>
where
    F: Future<Output = MemoryResult<T>>,
{
    tokio::time::timeout(budget, fut)
        .await
        .unwrap_or(Err(MemoryError::Timeout {
            operation,
            category,
            after: budget,
        }))
}

/// Run `fut` until a shared `deadline`; `budget` is only used in the error.
///
/// # Errors
/// Returns the inner error, or `Timeout` if the deadline passes first.
pub async fn until<T, F>(
    operation: &'static str,
    category: ErrorKind,
    deadline: Instant,
    budget: Duration,
    fut: F,
) -> MemoryResult<T>
where
    F: Future<Output = MemoryResult<T>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or(Err(MemoryError::Timeout {
            operation,
            category,
            after: budget,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_fast_calls() {
        let value = bounded("noop", ErrorKind::Store, Duration::from_secs(1), async {
            Ok::<_, MemoryError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out_with_category() {
        let err = bounded("slow", ErrorKind::Embedding, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, MemoryError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.report().kind, ErrorKind::Embedding);
    }
}

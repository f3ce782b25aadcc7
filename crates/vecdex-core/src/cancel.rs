//! Per-request cancellation (§5): "a request carries a cancellation/deadline
//! context that is honored by every outbound I/O call; on cancellation, an
//! in-flight embedding or storage call must be abandoned promptly and
//! surface a cancellation error."
//!
//! The HTTP edge scopes each request to a [`CancellationToken`] via
//! [`scoped`]; every storage/embedding call inside [`crate::document`],
//! [`crate::collection`], [`crate::search`], [`crate::batch`] and
//! [`crate::usage`] races against it through [`cancellable`]. Outside a
//! scoped call (plain library use, unit tests) `cancellable` is a
//! passthrough.

use crate::error::{Error, Result};
use std::future::Future;
use tokio::task_local;
pub use tokio_util::sync::CancellationToken;

task_local! {
    static CURRENT: CancellationToken;
}

/// Installs `token` as the ambient cancellation context for the duration of
/// `fut`. Call once per request, at the HTTP edge.
pub async fn scoped<F: Future>(token: CancellationToken, fut: F) -> F::Output {
    CURRENT.scope(token, fut).await
}

/// Races `fut` against the ambient token, if one is scoped. The loser is
/// dropped, abandoning whatever I/O `fut` was mid-flight on (a dropped
/// `reqwest`/`redis` future aborts its connection).
pub async fn cancellable<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match CURRENT.try_with(Clone::clone) {
        Ok(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled),
                res = fut => res,
            }
        }
        Err(_) => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellable_passes_through_without_a_scope() {
        let result: Result<i32> = cancellable(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancellable_surfaces_cancelled_once_token_fires() {
        let token = CancellationToken::new();
        let child = token.clone();
        token.cancel();
        let result: Result<i32> = scoped(child, cancellable(std::future::pending())).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancellable_resolves_normally_when_token_never_fires() {
        let token = CancellationToken::new();
        let result: Result<i32> = scoped(token, cancellable(async { Ok(3) })).await;
        assert_eq!(result.unwrap(), 3);
    }
}

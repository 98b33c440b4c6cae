use std::future::Future;
use std::time::Duration;

use crate::error::AuthServiceError;

pub mod audit;
pub mod magic_link;
pub mod mail;
pub mod rate_limit;
pub mod remember_me;
pub mod secret;
pub mod session;
pub mod sweep;

/// Run a call to an external collaborator under `limit`. Elapsing the limit is
/// a dependency failure like any other.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = Result<T, AuthServiceError>>,
) -> Result<T, AuthServiceError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AuthServiceError::dependency(anyhow::anyhow!(
            "{what} timed out after {limit:?}"
        ))),
    }
}

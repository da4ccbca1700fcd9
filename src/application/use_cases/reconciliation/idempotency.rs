use std::future::Future;

use crate::app_error::{AppError, AppResult};

/// Outcome of a ledger insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied<T> {
    Fresh(T),
    AlreadyApplied,
}

impl<T> Applied<T> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Applied::Fresh(_))
    }
}

/// Run an insert, treating a uniqueness violation as "already applied".
/// Every other error propagates.
pub async fn apply_once<T, F>(operation: &'static str, insert: F) -> AppResult<Applied<T>>
where
    F: Future<Output = AppResult<T>>,
{
    match insert.await {
        Ok(value) => Ok(Applied::Fresh(value)),
        Err(AppError::Duplicate) => {
            tracing::info!(operation, "Already applied, skipping");
            Ok(Applied::AlreadyApplied)
        }
        Err(e) => Err(e),
    }
}

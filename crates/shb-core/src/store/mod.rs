//! Store helpers shared by the synchronizer, the access guard and reconciliation.

pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use std::{future::Future, time::Duration};

use crate::{errors::Error, Result};

/// Run one store call under a deadline.
///
/// An elapsed deadline is reported as [`Error::Timeout`], which callers treat
/// exactly like a failed call of the same step.
pub async fn with_deadline<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout { op, after }),
    }
}

//! Infrastructure error wrapper
//!
//! Adapters convert their library errors into [`InfraError`] at the
//! boundary and hand the domain error up; callers only ever see
//! [`UmbonoError`].

use thiserror::Error;
use umbono_domain::UmbonoError;

/// Newtype carrying a domain error produced by an infrastructure adapter.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InfraError(pub UmbonoError);

impl From<rusqlite::Error> for InfraError {
    fn from(err: rusqlite::Error) -> Self {
        Self(UmbonoError::Database(err.to_string()))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(err: r2d2::Error) -> Self {
        Self(UmbonoError::Database(format!("connection pool: {err}")))
    }
}

impl From<InfraError> for UmbonoError {
    fn from(err: InfraError) -> Self {
        err.0
    }
}

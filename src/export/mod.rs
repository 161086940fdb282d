//! Provider-agnostic export pipeline.
//!
//! Each bank registers an [`ExporterConstructor`] under its [`ExportType`].
//! [`transactions`] validates the shared [`Options`], builds the exporter,
//! enforces its maximum date range and runs the export.

pub mod monzo;
mod options;
mod registry;
pub mod starling;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::api::ApiError;
use crate::error::{BoxError, ErrorKind};
use crate::models::{Account, Transaction};

pub use options::{Options, DEFAULT_TIMEOUT};
pub use registry::{
    accounts, all, new_exporter, register, registry, transactions, ExporterConstructor,
    ExporterRegistry,
};

/// Case-sensitive tag naming a bank, e.g. `Monzo`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExportType(String);

impl ExportType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExportType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ExportType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A bank-specific source of transactions and accounts.
#[async_trait]
pub trait Exporter: Send + Sync {
    fn export_type(&self) -> ExportType;

    /// Longest `end - start` the provider accepts; `None` means unbounded.
    fn max_date_range(&self) -> Option<TimeDelta>;

    async fn export_transactions(&self, opts: &Options) -> Result<Vec<Transaction>, ExportError>;

    async fn export_accounts(&self) -> Result<Vec<Account>, ExportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(ExportType),

    #[error("constructor")]
    Constructor(#[source] BoxError),

    #[error("parse account id {value:?}")]
    ParseAccountId {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("no accounts found")]
    NoAccounts,

    #[error("date range {days} days is too long, max is {max_days} days")]
    DateRangeTooLong { days: i64, max_days: i64 },

    #[error("pagination stopped after {pages} pages without reaching the end date")]
    PaginationLimit { pages: usize },

    #[error("{context}")]
    Api {
        context: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("context cancelled")]
    Cancelled,

    #[error("{phase}")]
    Phase {
        phase: &'static str,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::InvalidOptions(_) => ErrorKind::InvalidOptions,
            ExportError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            ExportError::Constructor(_) => ErrorKind::Constructor,
            ExportError::ParseAccountId { .. } => ErrorKind::ParseAccountId,
            ExportError::NoAccounts => ErrorKind::NoAccounts,
            ExportError::DateRangeTooLong { .. } => ErrorKind::DateRangeTooLong,
            ExportError::PaginationLimit { .. } => ErrorKind::PaginationLimit,
            ExportError::Api { source, .. } => source.kind(),
            ExportError::Cancelled => ErrorKind::Cancelled,
            ExportError::Phase { source, .. } => source.kind(),
        }
    }

    /// The underlying API error, looking through phase labels.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ExportError::Api { source, .. } => Some(source),
            ExportError::Phase { source, .. } => source.api_error(),
            _ => None,
        }
    }

    pub(crate) fn in_phase(self, phase: &'static str) -> Self {
        ExportError::Phase {
            phase,
            source: Box::new(self),
        }
    }

    pub(crate) fn api(context: &'static str) -> impl FnOnce(ApiError) -> Self {
        move |source| ExportError::Api { context, source }
    }
}

/// Run `export` until it finishes or `shutdown` resolves, whichever is first.
/// A shutdown drops the in-flight request and yields [`ExportError::Cancelled`];
/// an already-resolved shutdown wins over an export that is also ready.
pub async fn cancellable<T, F, S>(export: F, shutdown: S) -> Result<T, ExportError>
where
    F: Future<Output = Result<T, ExportError>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = shutdown => Err(ExportError::Cancelled),
        result = export => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn phase_wrappers_keep_kind_and_render_chain() {
        let err = ExportError::Constructor("bad client".into()).in_phase("exporter");
        assert_eq!(err.kind(), ErrorKind::Constructor);
        assert_eq!(
            format!("{:#}", anyhow::Error::new(err)),
            "exporter: constructor: bad client"
        );
    }

    #[test]
    fn api_errors_classify_by_source() {
        let err = ExportError::api("fetch accounts")(ApiError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "nope".to_string(),
        })
        .in_phase("transactions");
        assert_eq!(err.kind(), ErrorKind::ProviderApi);
        assert_eq!(
            err.api_error().and_then(ApiError::status),
            Some(StatusCode::UNAUTHORIZED)
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_export() {
        let result: Result<(), ExportError> =
            cancellable(std::future::pending(), std::future::ready(())).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn finished_export_wins_over_pending_shutdown() {
        let result = cancellable(async { Ok(7) }, std::future::pending()).await;
        assert_eq!(result.unwrap(), 7);
    }
}

use std::fmt;

/// Boxed error used at the constructor seams, where callers register
/// arbitrary closures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification shared by every error the export pipeline can surface.
///
/// Callers branch on the kind instead of matching error text. Phase wrappers
/// are transparent to classification: an `exporter: constructor: ...` error
/// still reports [`ErrorKind::Constructor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidOptions,
    UnsupportedType,
    Constructor,
    ParseAccountId,
    NoAccounts,
    ProviderApi,
    Transport,
    Cancelled,
    DateRangeTooLong,
    PaginationLimit,
    Formatter,
    Decode,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidOptions => "invalid-options",
            ErrorKind::UnsupportedType => "unsupported-type",
            ErrorKind::Constructor => "constructor",
            ErrorKind::ParseAccountId => "parse-account-id",
            ErrorKind::NoAccounts => "no-accounts",
            ErrorKind::ProviderApi => "provider-api",
            ErrorKind::Transport => "transport",
            ErrorKind::Cancelled => "context-cancelled",
            ErrorKind::DateRangeTooLong => "date-range-too-long",
            ErrorKind::PaginationLimit => "pagination-limit",
            ErrorKind::Formatter => "formatter",
            ErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

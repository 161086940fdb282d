//! Output formatters for exported transactions.
//!
//! A formatter writes in three phases: one header, one row per transaction,
//! then a flush. [`write_collection`] drives the phases and labels failures
//! with the phase they happened in.

mod csv_writer;
pub mod moneydance;
pub mod ynab;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{LazyLock, PoisonError, RwLock};

use chrono_tz::Tz;

use crate::error::{BoxError, ErrorKind};
use crate::models::Transaction;

/// Case-sensitive tag naming an output format, e.g. `ynab`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatType(String);

impl FormatType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FormatType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FormatType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

pub trait Formatter {
    fn write_header(&mut self) -> io::Result<()>;

    fn write_transaction(&mut self, txn: &Transaction) -> io::Result<()>;

    /// Push buffered output to the writer, surfacing any deferred error.
    fn flush(&mut self) -> io::Result<()>;
}

/// Builds a formatter over `writer`, rendering dates in `timezone`.
pub type FormatterConstructor =
    for<'w> fn(Box<dyn Write + 'w>, Tz) -> Result<Box<dyn Formatter + 'w>, BoxError>;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("unsupported type: {0}")]
    UnsupportedType(FormatType),

    #[error("constructor")]
    Constructor(#[source] BoxError),

    #[error("write header")]
    Header(#[source] io::Error),

    #[error("write transaction")]
    Transaction(#[source] io::Error),

    #[error("flush")]
    Flush(#[source] io::Error),
}

impl FormatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            FormatError::Constructor(_) => ErrorKind::Constructor,
            FormatError::Header(_) | FormatError::Transaction(_) | FormatError::Flush(_) => {
                ErrorKind::Formatter
            }
        }
    }
}

/// Header, then every transaction in order, then flush. Stops at the first error.
pub fn write_collection(
    formatter: &mut dyn Formatter,
    transactions: &[Transaction],
) -> Result<(), FormatError> {
    formatter.write_header().map_err(FormatError::Header)?;
    for txn in transactions {
        formatter
            .write_transaction(txn)
            .map_err(FormatError::Transaction)?;
    }
    formatter.flush().map_err(FormatError::Flush)
}

/// Maps format types to constructors.
pub struct FormatterRegistry {
    constructors: RwLock<BTreeMap<FormatType, FormatterConstructor>>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry with the MoneyDance and YNAB formatters.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(moneydance::FORMAT_TYPE, moneydance::new);
        registry.register(ynab::FORMAT_TYPE, ynab::new);
        registry
    }

    /// Register a constructor, replacing any previous one for the same type.
    pub fn register(&self, format_type: impl Into<FormatType>, constructor: FormatterConstructor) {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(format_type.into(), constructor);
    }

    /// Registered types in lexicographic order.
    pub fn all(&self) -> Vec<FormatType> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Build a formatter rendering dates in UTC.
    pub fn new_formatter<'w>(
        &self,
        format_type: &FormatType,
        writer: Box<dyn Write + 'w>,
    ) -> Result<Box<dyn Formatter + 'w>, FormatError> {
        self.new_formatter_in(format_type, writer, chrono_tz::UTC)
    }

    pub fn new_formatter_in<'w>(
        &self,
        format_type: &FormatType,
        writer: Box<dyn Write + 'w>,
        timezone: Tz,
    ) -> Result<Box<dyn Formatter + 'w>, FormatError> {
        let constructor = *self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(format_type)
            .ok_or_else(|| FormatError::UnsupportedType(format_type.clone()))?;

        constructor(writer, timezone).map_err(FormatError::Constructor)
    }
}

static REGISTRY: LazyLock<FormatterRegistry> = LazyLock::new(FormatterRegistry::with_builtin);

/// The process-wide registry, populated with the built-in formatters on first use.
pub fn registry() -> &'static FormatterRegistry {
    &REGISTRY
}

pub fn register(format_type: impl Into<FormatType>, constructor: FormatterConstructor) {
    registry().register(format_type, constructor)
}

pub fn all() -> Vec<FormatType> {
    registry().all()
}

pub fn new_formatter<'w>(
    format_type: &FormatType,
    writer: Box<dyn Write + 'w>,
) -> Result<Box<dyn Formatter + 'w>, FormatError> {
    registry().new_formatter(format_type, writer)
}

pub fn new_formatter_in<'w>(
    format_type: &FormatType,
    writer: Box<dyn Write + 'w>,
    timezone: Tz,
) -> Result<Box<dyn Formatter + 'w>, FormatError> {
    registry().new_formatter_in(format_type, writer, timezone)
}

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use super::{monzo, starling, ExportError, ExportType, Exporter, Options};
use crate::clock::{Clock, SystemClock};
use crate::error::BoxError;
use crate::models::{Account, Transaction};

/// Builds an exporter for one invocation from the shared options.
pub type ExporterConstructor =
    Arc<dyn Fn(&Options) -> Result<Box<dyn Exporter>, BoxError> + Send + Sync>;

/// Maps export types to constructors and runs the export pipeline.
///
/// Writes are expected at start-up only; lookups clone the constructor out of
/// the lock so no guard is held across an await.
pub struct ExporterRegistry {
    constructors: RwLock<BTreeMap<ExportType, ExporterConstructor>>,
    clock: Arc<dyn Clock>,
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// A registry with the Monzo and Starling exporters.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(monzo::EXPORT_TYPE, |opts: &Options| {
            Ok(Box::new(monzo::MonzoExporter::from_options(opts)?) as Box<dyn Exporter>)
        });
        registry.register(starling::EXPORT_TYPE, |opts: &Options| {
            Ok(Box::new(starling::StarlingExporter::from_options(opts)?) as Box<dyn Exporter>)
        });
        registry
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a constructor, replacing any previous one for the same type.
    pub fn register<F>(&self, export_type: impl Into<ExportType>, constructor: F)
    where
        F: Fn(&Options) -> Result<Box<dyn Exporter>, BoxError> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(export_type.into(), Arc::new(constructor));
    }

    /// Registered types in lexicographic order.
    pub fn all(&self) -> Vec<ExportType> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Case-insensitive lookup of a registered type, for command-line input.
    pub fn find(&self, name: &str) -> Option<ExportType> {
        self.all()
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn new_exporter(
        &self,
        export_type: &ExportType,
        opts: &Options,
    ) -> Result<Box<dyn Exporter>, ExportError> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(export_type)
            .cloned()
            .ok_or_else(|| ExportError::UnsupportedType(export_type.clone()))?;

        constructor(opts).map_err(ExportError::Constructor)
    }

    /// Validate options, build the exporter, check its date-range bound and
    /// export transactions.
    pub async fn transactions(
        &self,
        export_type: &ExportType,
        opts: &Options,
    ) -> Result<Vec<Transaction>, ExportError> {
        let (start, end) = opts.validate(self.clock.as_ref())?;

        let exporter = self
            .new_exporter(export_type, opts)
            .map_err(|err| err.in_phase("exporter"))?;

        if let Some(max) = exporter.max_date_range() {
            let requested = end - start;
            if max > chrono::TimeDelta::zero() && requested > max {
                return Err(ExportError::DateRangeTooLong {
                    days: requested.num_days(),
                    max_days: max.num_days(),
                });
            }
        }

        exporter
            .export_transactions(opts)
            .await
            .map_err(|err| err.in_phase("transactions"))
    }

    /// Build the exporter and list the accounts the token can see.
    pub async fn accounts(
        &self,
        export_type: &ExportType,
        opts: &Options,
    ) -> Result<Vec<Account>, ExportError> {
        opts.validate_auth()?;

        let exporter = self
            .new_exporter(export_type, opts)
            .map_err(|err| err.in_phase("exporter"))?;

        exporter
            .export_accounts()
            .await
            .map_err(|err| err.in_phase("accounts"))
    }
}

static REGISTRY: LazyLock<ExporterRegistry> = LazyLock::new(ExporterRegistry::with_builtin);

/// The process-wide registry, populated with the built-in exporters on first use.
pub fn registry() -> &'static ExporterRegistry {
    &REGISTRY
}

pub fn register<F>(export_type: impl Into<ExportType>, constructor: F)
where
    F: Fn(&Options) -> Result<Box<dyn Exporter>, BoxError> + Send + Sync + 'static,
{
    registry().register(export_type, constructor)
}

pub fn all() -> Vec<ExportType> {
    registry().all()
}

pub fn new_exporter(
    export_type: &ExportType,
    opts: &Options,
) -> Result<Box<dyn Exporter>, ExportError> {
    registry().new_exporter(export_type, opts)
}

pub async fn transactions(
    export_type: &ExportType,
    opts: &Options,
) -> Result<Vec<Transaction>, ExportError> {
    registry().transactions(export_type, opts).await
}

pub async fn accounts(
    export_type: &ExportType,
    opts: &Options,
) -> Result<Vec<Account>, ExportError> {
    registry().accounts(export_type, opts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn builtin_types_are_sorted() {
        let registry = ExporterRegistry::with_builtin();
        assert_eq!(
            registry.all(),
            vec![ExportType::from("Monzo"), ExportType::from("Starling")]
        );
        assert_eq!(registry.find("monzo"), Some(ExportType::from("Monzo")));
        assert_eq!(registry.find("barclays"), None);
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let registry = ExporterRegistry::new();
        let err = match registry.new_exporter(&ExportType::from("Nope"), &Options::new("t")) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert_eq!(err.to_string(), "unsupported type: Nope");
    }

    #[test]
    fn constructor_failure_is_wrapped() {
        let registry = ExporterRegistry::new();
        registry.register("Broken", |_: &Options| Err("no client".into()));
        let err = match registry.new_exporter(&ExportType::from("Broken"), &Options::new("t")) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::Constructor);
    }
}

//! Command orchestration behind the `fingrab` binary.
//!
//! [`App`] turns command-line requests into export pipeline calls: it resolves
//! the bank, the date window, the output format and the auth token, then
//! writes the export. One shutdown signal covers both the browser login and
//! the export.

mod auth;
mod dates;

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use secrecy::ExposeSecret;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::export::{self, ExportType, ExporterRegistry, Options};
use crate::format::{self, FormatError, FormatType, FormatterRegistry};

pub use auth::{auth_token, credential_store, oauth_config, oauth_endpoints, stored_token};
pub use dates::{parse_date, resolve_date_range, DATE_FORMAT};

/// `fingrab <bank> transactions`.
#[derive(Debug, Clone, Default)]
pub struct TransactionsRequest {
    pub bank: String,
    pub start: String,
    pub end: Option<String>,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub account_id: Option<String>,
    pub format: Option<String>,
    pub timezone: Option<String>,
}

/// `fingrab <bank> accounts`.
#[derive(Debug, Clone, Default)]
pub struct AccountsRequest {
    pub bank: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

pub struct App<'r> {
    config: Config,
    exporters: &'r ExporterRegistry,
    formatters: &'r FormatterRegistry,
    clock: Arc<dyn Clock>,
}

impl App<'static> {
    /// An app over the process-wide registries.
    pub fn new(config: Config) -> Self {
        App::with_registries(config, export::registry(), format::registry())
    }
}

impl<'r> App<'r> {
    pub fn with_registries(
        config: Config,
        exporters: &'r ExporterRegistry,
        formatters: &'r FormatterRegistry,
    ) -> Self {
        Self {
            config,
            exporters,
            formatters,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn bank(&self, name: &str) -> Result<ExportType> {
        self.exporters.find(name).with_context(|| {
            let supported: Vec<String> = self.exporters.all().iter().map(ToString::to_string).collect();
            format!(
                "unsupported bank type: {name} (supported types: {})",
                supported.join(", ")
            )
        })
    }

    fn timezone(&self, flag: Option<&str>) -> Result<Tz> {
        match flag {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|err| anyhow::anyhow!("Invalid timezone {name:?}: {err}")),
            None => self.config.timezone(),
        }
    }

    async fn token<S>(&self, bank: &ExportType, flag: Option<&str>, shutdown: S) -> Result<String>
    where
        S: Future<Output = ()>,
    {
        let store = credential_store(bank, &self.config);
        let token = auth_token(bank, flag, &store, shutdown)
            .await
            .context("authentication failed")?;
        Ok(token.expose_secret().to_string())
    }

    /// Export transactions and write them to `out`. Returns the row count.
    pub async fn transactions<S>(
        &self,
        request: &TransactionsRequest,
        out: &mut dyn Write,
        shutdown: S,
    ) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        self.run_transactions(request, out, shutdown)
            .await
            .with_context(|| request.bank.to_lowercase())
    }

    async fn run_transactions<S>(
        &self,
        request: &TransactionsRequest,
        out: &mut dyn Write,
        shutdown: S,
    ) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let bank = self.bank(&request.bank)?;
        let (start, end) =
            resolve_date_range(&request.start, request.end.as_deref(), self.clock.as_ref())?;

        let format_type = FormatType::from(
            request
                .format
                .clone()
                .unwrap_or_else(|| self.config.format.clone()),
        );
        if !self.formatters.all().contains(&format_type) {
            return Err(FormatError::UnsupportedType(format_type)).context("formatter");
        }
        let timezone = self.timezone(request.timezone.as_deref())?;

        let token = self
            .token(&bank, request.token.as_deref(), shutdown.as_mut())
            .await?;
        let mut opts = Options::new(token)
            .with_date_range(start, end)
            .with_timeout(request.timeout.unwrap_or(self.config.timeout));
        let account_id = request.account_id.clone().or_else(|| {
            self.config
                .bank(bank.as_str())
                .and_then(|bank| bank.account_id.clone())
        });
        if let Some(account_id) = account_id {
            opts = opts.with_account_id(account_id);
        }

        tracing::info!(
            bank = %bank,
            export.start = %start.format(DATE_FORMAT),
            export.end = %end.format(DATE_FORMAT),
            "exporting transactions"
        );
        let transactions = export::cancellable(self.exporters.transactions(&bank, &opts), shutdown)
            .await
            .context("export")?;

        let mut formatter = self
            .formatters
            .new_formatter_in(&format_type, Box::new(out), timezone)
            .context("formatter")?;
        format::write_collection(formatter.as_mut(), &transactions)?;

        tracing::info!(
            bank = %bank,
            transaction.count = transactions.len(),
            "exported transactions"
        );
        Ok(transactions.len())
    }

    /// Write the id of every account the token can see, one per line.
    pub async fn accounts<S>(
        &self,
        request: &AccountsRequest,
        out: &mut dyn Write,
        shutdown: S,
    ) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        self.run_accounts(request, out, shutdown)
            .await
            .with_context(|| request.bank.to_lowercase())
    }

    async fn run_accounts<S>(
        &self,
        request: &AccountsRequest,
        out: &mut dyn Write,
        shutdown: S,
    ) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let bank = self.bank(&request.bank)?;
        let token = self
            .token(&bank, request.token.as_deref(), shutdown.as_mut())
            .await?;
        let opts =
            Options::new(token).with_timeout(request.timeout.unwrap_or(self.config.timeout));

        let accounts = export::cancellable(self.exporters.accounts(&bank, &opts), shutdown)
            .await
            .context("export")?;

        for account in &accounts {
            writeln!(out, "{}", account.id)?;
        }
        out.flush()?;
        Ok(accounts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::export::{ExportError, Exporter};
    use crate::models::{Account, Money, Transaction};
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Mutex;

    struct StubExporter {
        seen: Arc<Mutex<Vec<Options>>>,
    }

    #[async_trait]
    impl Exporter for StubExporter {
        fn export_type(&self) -> ExportType {
            ExportType::from("Stub")
        }

        fn max_date_range(&self) -> Option<TimeDelta> {
            None
        }

        async fn export_transactions(&self, opts: &Options) -> Result<Vec<Transaction>, ExportError> {
            self.seen.lock().unwrap().push(opts.clone());
            Ok(vec![Transaction {
                amount: Money::new(12345, "GBP"),
                reference: "Test Transaction".to_string(),
                category: "Test Category".to_string(),
                created_at: Utc.with_ymd_and_hms(2025, 4, 16, 9, 0, 0).unwrap(),
                is_deposit: true,
                bank_name: "Stub".to_string(),
                notes: "Test Notes".to_string(),
            }])
        }

        async fn export_accounts(&self) -> Result<Vec<Account>, ExportError> {
            Ok(vec![
                Account {
                    id: "acc_1".to_string(),
                    account_type: "uk_retail".to_string(),
                    created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                },
                Account {
                    id: "acc_2".to_string(),
                    account_type: "uk_retail_joint".to_string(),
                    created_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                },
            ])
        }
    }

    struct Fixture {
        exporters: ExporterRegistry,
        formatters: FormatterRegistry,
        seen: Arc<Mutex<Vec<Options>>>,
        clock: Arc<FixedClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2025, 4, 20, 12, 0, 0).unwrap(),
            ));
            let exporters = ExporterRegistry::new().with_clock(clock.clone());
            let seen = Arc::new(Mutex::new(Vec::new()));
            let captured = seen.clone();
            exporters.register("Stub", move |_opts: &Options| {
                Ok(Box::new(StubExporter {
                    seen: captured.clone(),
                }) as Box<dyn Exporter>)
            });
            Self {
                exporters,
                formatters: FormatterRegistry::with_builtin(),
                seen,
                clock,
            }
        }

        fn app(&self, config: Config) -> App<'_> {
            App::with_registries(config, &self.exporters, &self.formatters)
                .with_clock(self.clock.clone())
        }
    }

    fn request() -> TransactionsRequest {
        TransactionsRequest {
            bank: "stub".to_string(),
            start: "2025-04-01".to_string(),
            token: Some("tok".to_string()),
            ..TransactionsRequest::default()
        }
    }

    #[tokio::test]
    async fn transactions_writes_default_format() -> Result<()> {
        let fixture = Fixture::new();
        let app = fixture.app(Config::default());

        let mut out = Vec::new();
        let count = app
            .transactions(&request(), &mut out, std::future::pending())
            .await?;

        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(out)?,
            "check number,date,description,category,amount,memo\n\
             Dep,2025-04-16,Test Transaction,Test Category,123.45,Test Notes\n"
        );

        let seen = fixture.seen.lock().unwrap();
        assert_eq!(seen[0].bearer_auth_token(), "Bearer tok");
        assert_eq!(
            seen[0].end_date,
            Some(Utc.with_ymd_and_hms(2025, 4, 21, 0, 0, 0).unwrap())
        );
        assert_eq!(seen[0].timeout, Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    async fn request_flags_override_config() -> Result<()> {
        let fixture = Fixture::new();
        let config: Config = toml::from_str(
            r#"
format = "moneydance"
timeout = "30s"

[banks.stub]
account_id = "from-config"
"#,
        )?;
        let app = fixture.app(config);

        let mut out = Vec::new();
        let req = TransactionsRequest {
            format: Some("ynab".to_string()),
            timezone: Some("America/New_York".to_string()),
            timeout: Some(Duration::from_secs(2)),
            ..request()
        };
        app.transactions(&req, &mut out, std::future::pending()).await?;
        assert_eq!(
            String::from_utf8(out)?,
            "Date,Payee,Memo,Amount\n04/16/2025,Test Transaction,Test Notes,123.45\n"
        );

        let mut out = Vec::new();
        app.transactions(&request(), &mut out, std::future::pending()).await?;

        let seen = fixture.seen.lock().unwrap();
        assert_eq!(seen[0].timeout, Duration::from_secs(2));
        assert_eq!(seen[0].account_id(), Some("from-config"));
        assert_eq!(seen[1].timeout, Duration::from_secs(30));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_format_fails_before_export() {
        let fixture = Fixture::new();
        let app = fixture.app(Config::default());

        let req = TransactionsRequest {
            format: Some("qif".to_string()),
            ..request()
        };
        let err = app
            .transactions(&req, &mut Vec::new(), std::future::pending())
            .await
            .unwrap_err();

        assert_eq!(format!("{err:#}"), "stub: formatter: unsupported type: qif");
        assert!(fixture.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_bank_lists_supported_types() {
        let fixture = Fixture::new();
        let app = fixture.app(Config::default());

        let req = TransactionsRequest {
            bank: "barclays".to_string(),
            ..request()
        };
        let err = app
            .transactions(&req, &mut Vec::new(), std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "barclays: unsupported bank type: barclays (supported types: Stub)"
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_export() {
        let fixture = Fixture::new();
        let app = fixture.app(Config::default());

        let mut out = Vec::new();
        let err = app
            .transactions(&request(), &mut out, std::future::ready(()))
            .await
            .unwrap_err();

        let export_err = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<ExportError>())
            .expect("export error");
        assert_eq!(export_err.kind(), crate::error::ErrorKind::Cancelled);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn accounts_prints_one_id_per_line() -> Result<()> {
        let fixture = Fixture::new();
        let app = fixture.app(Config::default());

        let mut out = Vec::new();
        let req = AccountsRequest {
            bank: "Stub".to_string(),
            token: Some("tok".to_string()),
            timeout: None,
        };
        let count = app.accounts(&req, &mut out, std::future::pending()).await?;

        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out)?, "acc_1\nacc_2\n");
        Ok(())
    }
}

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Comma-separated, LF-terminated writer shared by the CSV formatters.
pub(crate) struct CsvWriter<'w> {
    writer: csv::Writer<Box<dyn Write + 'w>>,
    timezone: Tz,
}

impl<'w> CsvWriter<'w> {
    pub(crate) fn new(writer: Box<dyn Write + 'w>, timezone: Tz) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        Self { writer, timezone }
    }

    pub(crate) fn write_record(&mut self, record: &[&str]) -> io::Result<()> {
        self.writer.write_record(record).map_err(io::Error::from)
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// `at` rendered with a strftime `pattern` in the configured timezone.
    pub(crate) fn date(&self, at: DateTime<Utc>, pattern: &str) -> String {
        at.with_timezone(&self.timezone).format(pattern).to_string()
    }
}

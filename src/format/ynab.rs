//! YNAB CSV import format.

use std::io::{self, Write};

use chrono_tz::Tz;

use super::csv_writer::CsvWriter;
use super::Formatter;
use crate::error::BoxError;
use crate::models::Transaction;

pub const FORMAT_TYPE: &str = "ynab";

const HEADER: [&str; 4] = ["Date", "Payee", "Memo", "Amount"];
const DATE_PATTERN: &str = "%m/%d/%Y";

pub struct YnabFormatter<'w> {
    csv: CsvWriter<'w>,
}

impl<'w> YnabFormatter<'w> {
    pub fn new(writer: Box<dyn Write + 'w>, timezone: Tz) -> Self {
        Self {
            csv: CsvWriter::new(writer, timezone),
        }
    }
}

/// Registry constructor.
pub fn new<'w>(writer: Box<dyn Write + 'w>, timezone: Tz) -> Result<Box<dyn Formatter + 'w>, BoxError> {
    Ok(Box::new(YnabFormatter::new(writer, timezone)))
}

impl Formatter for YnabFormatter<'_> {
    fn write_header(&mut self) -> io::Result<()> {
        self.csv.write_record(&HEADER)
    }

    fn write_transaction(&mut self, txn: &Transaction) -> io::Result<()> {
        let date = self.csv.date(txn.created_at, DATE_PATTERN);
        let amount = txn.amount.to_string();
        self.csv.write_record(&[
            date.as_str(),
            txn.reference.as_str(),
            txn.notes.as_str(),
            amount.as_str(),
        ])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.csv.flush()
    }
}

//! MoneyDance CSV import format.

use std::io::{self, Write};

use chrono_tz::Tz;

use super::csv_writer::CsvWriter;
use super::Formatter;
use crate::error::BoxError;
use crate::models::Transaction;

pub const FORMAT_TYPE: &str = "moneydance";

const HEADER: [&str; 6] = [
    "check number",
    "date",
    "description",
    "category",
    "amount",
    "memo",
];
const DATE_PATTERN: &str = "%Y-%m-%d";

pub struct MoneyDanceFormatter<'w> {
    csv: CsvWriter<'w>,
}

impl<'w> MoneyDanceFormatter<'w> {
    pub fn new(writer: Box<dyn Write + 'w>, timezone: Tz) -> Self {
        Self {
            csv: CsvWriter::new(writer, timezone),
        }
    }
}

/// Registry constructor.
pub fn new<'w>(writer: Box<dyn Write + 'w>, timezone: Tz) -> Result<Box<dyn Formatter + 'w>, BoxError> {
    Ok(Box::new(MoneyDanceFormatter::new(writer, timezone)))
}

impl Formatter for MoneyDanceFormatter<'_> {
    fn write_header(&mut self) -> io::Result<()> {
        self.csv.write_record(&HEADER)
    }

    fn write_transaction(&mut self, txn: &Transaction) -> io::Result<()> {
        let check_number = if txn.is_deposit { "Dep" } else { "Trn" };
        let date = self.csv.date(txn.created_at, DATE_PATTERN);
        let amount = txn.amount.to_string();
        self.csv.write_record(&[
            check_number,
            date.as_str(),
            txn.reference.as_str(),
            txn.category.as_str(),
            amount.as_str(),
            txn.notes.as_str(),
        ])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.csv.flush()
    }
}

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use fingrab::api::monzo::MonzoClient;
use fingrab::api::starling::StarlingClient;
use fingrab::api::{http_client, RetryPolicy};
use fingrab::format::{self, FormatType};
use fingrab::models::Transaction;
use wiremock::MockServer;

pub const TOKEN: &str = "Bearer test-token";

/// Retries without the production back-off so failure tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

pub fn http() -> reqwest::Client {
    http_client(Duration::from_secs(5)).expect("http client")
}

pub fn monzo_client(server: &MockServer) -> MonzoClient {
    MonzoClient::new(http())
        .with_base_url(server.uri())
        .with_auth_token(TOKEN)
        .with_retry_policy(RetryPolicy::none())
}

pub fn starling_client(server: &MockServer) -> StarlingClient {
    StarlingClient::new(http())
        .with_base_url(server.uri())
        .with_auth_token(TOKEN)
        .with_retry_policy(RetryPolicy::none())
}

/// Midnight UTC on the given day.
pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
        .and_utc()
}

/// Render transactions with a registered formatter, in UTC.
pub fn render(format_type: &str, transactions: &[Transaction]) -> String {
    let mut out = Vec::new();
    {
        let mut formatter = format::new_formatter(&FormatType::from(format_type), Box::new(&mut out))
            .expect("formatter");
        format::write_collection(formatter.as_mut(), transactions).expect("write collection");
    }
    String::from_utf8(out).expect("utf-8 output")
}

/// Data rows of a rendered CSV, without the header.
pub fn rows(csv: &str) -> Vec<&str> {
    csv.lines().skip(1).collect()
}

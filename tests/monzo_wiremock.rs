mod support;

use anyhow::Result;
use fingrab::api::monzo::{FetchTransactionsOptions, MonzoApi};
use fingrab::error::ErrorKind;
use fingrab::export::monzo::MonzoExporter;
use fingrab::export::{Exporter, Options};
use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{day, monzo_client, render, rows};

async fn mount_accounts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .and(header("authorization", support::TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [
                {
                    "id": "acc_1",
                    "description": "user_0000",
                    "created": "2019-03-01T10:00:00.000Z",
                    "type": "uk_retail",
                    "currency": "GBP"
                },
                {
                    "id": "acc_2",
                    "description": "joint",
                    "created": "2021-03-01T10:00:00.000Z",
                    "type": "uk_retail_joint",
                    "currency": "GBP"
                }
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_pots(server: &MockServer, pots: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/pots"))
        .and(query_param("current_account_id", "acc_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pots": pots })))
        .mount(server)
        .await;
}

/// First page keyed on the start timestamp, then an empty page after `last_id`.
async fn mount_single_page(server: &MockServer, transactions: serde_json::Value, last_id: &str) {
    Mock::given(method("GET"))
        .and(path("/transactions"))
        .and(query_param("account_id", "acc_1"))
        .and(query_param("expand[]", "merchant"))
        .and(query_param("limit", "100"))
        .and(query_param("since", "2025-01-20T00:00:00Z"))
        .and(query_param("before", "2025-02-01T00:00:00Z"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "transactions": transactions })),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/transactions"))
        .and(query_param("since", last_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "transactions": [] })))
        .expect(1)
        .mount(server)
        .await;
}

fn opts() -> Options {
    Options::new("test-token").with_date_range(day(2025, 1, 20), day(2025, 1, 31))
}

#[tokio::test]
async fn monzo_debit_renders_moneydance_row() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_pots(&server, json!([])).await;
    mount_single_page(
        &server,
        json!([
            {
                "id": "tx_1",
                "created": "2025-01-25T10:00:00.000Z",
                "description": "TFL TRAVEL CH",
                "amount": -280,
                "currency": "GBP",
                "local_amount": -280,
                "local_currency": "GBP",
                "notes": "Travel",
                "category": "transport",
                "settled": "2025-01-26T04:00:00.000Z",
                "merchant": { "id": "merch_1", "name": "TfL", "category": "transport" },
                "counterparty": {},
                "decline_reason": "",
                "metadata": {}
            }
        ]),
        "tx_1",
    )
    .await;

    let exporter = MonzoExporter::new(monzo_client(&server));
    let transactions = exporter.export_transactions(&opts()).await?;

    assert_eq!(
        rows(&render("moneydance", &transactions)),
        vec!["Trn,2025-01-25,TfL,transport,-2.80,Travel"]
    );
    Ok(())
}

#[tokio::test]
async fn active_card_checks_are_not_exported() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_pots(&server, json!([])).await;
    mount_single_page(
        &server,
        json!([
            {
                "id": "tx_check",
                "created": "2025-01-21T09:00:00.000Z",
                "description": "AMAZON",
                "amount": 0,
                "currency": "GBP",
                "local_amount": 0,
                "local_currency": "GBP",
                "metadata": { "notes": "Active card check" }
            },
            {
                "id": "tx_coffee",
                "created": "2025-01-22T09:00:00.000Z",
                "description": "Coffee",
                "amount": -500,
                "currency": "GBP",
                "local_amount": -500,
                "local_currency": "GBP",
                "category": "eating_out",
                "metadata": {}
            }
        ]),
        "tx_coffee",
    )
    .await;

    let transactions = MonzoExporter::new(monzo_client(&server))
        .export_transactions(&opts())
        .await?;

    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].reference, "Coffee");
    assert_eq!(transactions[0].amount.to_string(), "-5.00");
    assert!(!transactions[0].is_deposit);
    Ok(())
}

#[tokio::test]
async fn pot_transfers_are_named_after_the_pot() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_pots(&server, json!([{ "id": "pot_1", "name": "Holiday", "currency": "GBP" }])).await;
    mount_single_page(
        &server,
        json!([
            {
                "id": "tx_pot",
                "created": "2025-01-23T09:00:00.000Z",
                "description": "pot_1",
                "amount": -10000,
                "currency": "GBP",
                "local_amount": -10000,
                "local_currency": "GBP",
                "category": "savings",
                "merchant": null
            }
        ]),
        "tx_pot",
    )
    .await;

    let transactions = MonzoExporter::new(monzo_client(&server))
        .export_transactions(&opts())
        .await?;

    assert_eq!(transactions[0].reference, "Holiday Pot");
    Ok(())
}

#[tokio::test]
async fn accounts_are_exported_in_provider_order() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;

    let accounts = MonzoExporter::new(monzo_client(&server))
        .export_accounts()
        .await?;

    let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["acc_1", "acc_2"]);
    assert_eq!(accounts[1].account_type, "uk_retail_joint");
    Ok(())
}

#[tokio::test]
async fn single_transaction_route_lifts_bare_merchant_id() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/tx_9"))
        .and(query_param("expand[]", "merchant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transaction": {
                "id": "tx_9",
                "created": "2025-01-25T10:00:00Z",
                "description": "SHOP",
                "amount": 1500,
                "currency": "GBP",
                "local_amount": 1500,
                "local_currency": "GBP",
                "merchant": "merch_42",
                "settled": ""
            }
        })))
        .mount(&server)
        .await;

    let txn = monzo_client(&server).fetch_transaction("tx_9").await?;
    assert_eq!(txn.merchant.map(|m| m.id), Some("merch_42".to_string()));
    assert_eq!(txn.settled, None);
    Ok(())
}

#[tokio::test]
async fn unauthorized_is_a_typed_provider_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "unauthorized.bad_access_token",
            "message": "Access token is malformed"
        })))
        .mount(&server)
        .await;

    let err = MonzoExporter::new(monzo_client(&server))
        .export_transactions(&opts())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProviderApi);
    let api = err.api_error().expect("api error");
    assert_eq!(api.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(
        api.provider().map(|p| p.code()),
        Some("unauthorized.bad_access_token")
    );
    assert_eq!(
        format!("{:#}", anyhow::Error::new(err)),
        "fetch accounts: Access token is malformed (http status=401)"
    );
    Ok(())
}

#[tokio::test]
async fn invalid_time_range_is_rejected_before_sending() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = monzo_client(&server)
        .fetch_transactions_since(&FetchTransactionsOptions {
            account_id: "acc_1".to_string(),
            start: Some(day(2025, 2, 1)),
            end: Some(day(2025, 1, 1)),
            ..FetchTransactionsOptions::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "start time must be before end time");
    Ok(())
}

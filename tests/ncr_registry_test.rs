//! Integration tests for the NCR registry: creation, filtering, export,
//! cancel, item edits flowing to returns and return requests raised from
//! NCR lines.

mod common;

use axum::http::{header, Method};
use std::sync::Arc;

use common::{ncr_payload, response_json, response_text, FlakyStore, TestApp};
use serde_json::{json, Value};

fn row_nos(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["ncrNo"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn list_expands_items_and_sorts_newest_first() {
    let app = TestApp::new().await;
    app.create_ncr(ncr_payload("NCR-001", "2024-02-01", &[("A-1", "INV-1")]))
        .await;
    app.create_ncr(ncr_payload(
        "NCR-002",
        "2024-02-10",
        &[("B-1", "INV-2"), ("B-2", "INV-3")],
    ))
    .await;

    let body = response_json(app.as_manager(Method::GET, "/api/v1/ncr", None).await).await;
    assert_eq!(row_nos(&body), vec!["NCR-002", "NCR-002", "NCR-001"]);
    assert_eq!(body["data"][1]["itemIndex"], 1);
    assert_eq!(body["data"][0]["action"], "Reject");
    assert!(body["data"][0]["returnStatus"].is_null());
}

#[tokio::test]
async fn list_applies_date_text_and_cost_filters() {
    let app = TestApp::new().await;
    app.create_ncr(ncr_payload("NCR-010", "2024-01-05", &[("A-1", "INV-1")]))
        .await;
    app.create_ncr(ncr_payload("NCR-011", "2024-01-15", &[("A-2", "INV-2")]))
        .await;

    let mut costly = ncr_payload("NCR-012", "2024-01-25", &[("ZZ-9", "INV-3")]);
    costly["items"][0]["costAmount"] = json!("250");
    app.create_ncr(costly).await;

    let in_range = response_json(
        app.as_manager(
            Method::GET,
            "/api/v1/ncr?startDate=2024-01-10&endDate=2024-01-25",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(row_nos(&in_range), vec!["NCR-012", "NCR-011"]);

    let by_text = response_json(app.as_manager(Method::GET, "/api/v1/ncr?query=zz-9", None).await).await;
    assert_eq!(row_nos(&by_text), vec!["NCR-012"]);

    let with_cost = response_json(
        app.as_manager(Method::GET, "/api/v1/ncr?hasCost=true", None)
            .await,
    )
    .await;
    assert_eq!(row_nos(&with_cost), vec!["NCR-012"]);

    let not_returned = response_json(
        app.as_manager(Method::GET, "/api/v1/ncr?returnStatus=NotReturned", None)
            .await,
    )
    .await;
    assert_eq!(not_returned["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn duplicate_ncr_number_conflicts() {
    let app = TestApp::new().await;
    app.create_ncr(ncr_payload("NCR-020", "2024-02-01", &[("A-1", "INV-1")]))
        .await;

    let response = app
        .as_manager(
            Method::POST,
            "/api/v1/ncr",
            Some(ncr_payload("ncr-020", "2024-02-02", &[("A-1", "INV-1")])),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn ncr_without_items_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .as_manager(
            Method::POST,
            "/api/v1/ncr",
            Some(ncr_payload("NCR-021", "2024-02-01", &[])),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn csv_export_has_one_line_per_item_with_escaped_quotes() {
    let app = TestApp::new().await;
    let mut payload = ncr_payload("NCR-030", "2024-03-01", &[("C-1", "INV-1"), ("C-2", "INV-2")]);
    payload["items"][0]["productName"] = json!("Sauce \"Extra Hot\"");
    app.create_ncr(payload).await;

    let response = app
        .as_manager(Method::GET, "/api/v1/reports/ncr.csv", None)
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"ncr_report_2024-03-05.csv\""
    );

    let csv = response_text(response).await;
    assert!(csv.starts_with('\u{FEFF}'));
    let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("NCR No,Date,Status"));
    assert!(lines[1].contains("\"Sauce \"\"Extra Hot\"\"\""));
    assert!(lines[1].ends_with("\"Reject\",\"Not Returned\""));
    assert!(lines[2].contains("\"C-2\""));
}

#[tokio::test]
async fn cancel_is_idempotent_and_freezes_the_document() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload("NCR-040", "2024-03-01", &[("D-1", "INV-1")]))
        .await;
    let id = ncr["id"].as_str().unwrap();
    let uri = format!("/api/v1/ncr/{}/cancel", id);

    let first = response_json(app.as_manager(Method::POST, &uri, None).await).await;
    assert_eq!(first["message"], "NCR canceled");
    assert_eq!(first["data"]["ncr"]["status"], "Canceled");
    assert_eq!(first["data"]["ncr"]["canceledBy"], "Malee");
    let canceled_at = first["data"]["ncr"]["canceledAt"].clone();

    let second = response_json(app.as_manager(Method::POST, &uri, None).await).await;
    assert_eq!(second["message"], "NCR was already canceled");
    assert_eq!(second["data"]["alreadyCanceled"], true);
    assert_eq!(second["data"]["ncr"]["canceledAt"], canceled_at);

    let edit = app
        .as_manager(
            Method::PATCH,
            &format!("/api/v1/ncr/{}", id),
            Some(json!({ "problemDetail": "Changed" })),
        )
        .await;
    assert_eq!(edit.status(), 400);

    let draft = app
        .as_manager(
            Method::GET,
            &format!("/api/v1/ncr/{}/items/0/return-draft", id),
            None,
        )
        .await;
    assert_eq!(draft.status(), 400);
}

#[tokio::test]
async fn return_draft_is_prefilled_from_the_item() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload("NCR-050", "2024-03-01", &[("E-1", "INV-77")]))
        .await;
    let id = ncr["id"].as_str().unwrap();

    let body = response_json(
        app.as_manager(
            Method::GET,
            &format!("/api/v1/ncr/{}/items/0/return-draft", id),
            None,
        )
        .await,
    )
    .await;
    let draft = &body["data"];
    assert_eq!(draft["ncrNumber"], "NCR-050");
    assert_eq!(draft["refNo"], "INV-77");
    assert_eq!(draft["productCode"], "E-1");
    assert_eq!(draft["branch"], "North");
    assert_eq!(draft["date"], "2024-03-01");
    assert_eq!(draft["reason"], "From NCR: Crushed cartons (Supplier packing)");
    assert_eq!(draft["actionReject"], true);

    let missing = app
        .as_manager(
            Method::GET,
            &format!("/api/v1/ncr/{}/items/3/return-draft", id),
            None,
        )
        .await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn return_raised_from_ncr_shows_in_the_registry() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload("NCR-060", "2024-03-01", &[("F-1", "INV-88")]))
        .await;
    let id = ncr["id"].as_str().unwrap();

    let created = app
        .as_manager(
            Method::POST,
            &format!("/api/v1/ncr/{}/items/0/return", id),
            None,
        )
        .await;
    assert_eq!(created.status(), 200);
    let record = response_json(created).await["data"].clone();
    assert_eq!(record["status"], "Requested");
    assert_eq!(record["ncrNumber"], "NCR-060");

    let requested = response_json(
        app.as_manager(Method::GET, "/api/v1/ncr?returnStatus=Requested", None)
            .await,
    )
    .await;
    assert_eq!(row_nos(&requested), vec!["NCR-060"]);
    assert_eq!(requested["data"][0]["returnStatus"], "Requested");
}

#[tokio::test]
async fn item_edits_propagate_to_matching_returns() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload("NCR-070", "2024-03-01", &[("G-1", "INV-99")]))
        .await;
    let id = ncr["id"].as_str().unwrap();
    let created = response_json(
        app.as_manager(
            Method::POST,
            &format!("/api/v1/ncr/{}/items/0/return", id),
            None,
        )
        .await,
    )
    .await;
    let return_id = created["data"]["id"].as_str().unwrap().to_string();

    let mut items = ncr["items"].clone();
    items[0]["quantity"] = json!("10");
    items[0]["productName"] = json!("Product G-1 (relabelled)");

    let update = app
        .as_manager(
            Method::PATCH,
            &format!("/api/v1/ncr/{}", id),
            Some(json!({ "items": items })),
        )
        .await;
    assert_eq!(update.status(), 200);
    let update = response_json(update).await;
    assert_eq!(update["data"]["syncedReturns"], json!([return_id.clone()]));

    let record = response_json(
        app.as_manager(Method::GET, &format!("/api/v1/returns/{}", return_id), None)
            .await,
    )
    .await;
    assert_eq!(record["data"]["quantity"], "10");
    assert_eq!(record["data"]["productName"], "Product G-1 (relabelled)");
    assert_eq!(record["data"]["amount"], "1200");
    assert_eq!(record["data"]["status"], "Requested");
}

#[tokio::test]
async fn print_view_renders_the_document() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload("NCR-080", "2024-03-01", &[("H-1", "INV-5")]))
        .await;
    let id = ncr["id"].as_str().unwrap();

    let response = app
        .as_manager(Method::GET, &format!("/api/v1/ncr/{}/print", id), None)
        .await;
    assert_eq!(response.status(), 200);
    let html = response_text(response).await;
    assert!(html.contains("Acme Foods QC"));
    assert!(html.contains("NCR-080"));
    assert!(html.contains("H-1"));
}

#[tokio::test]
async fn a_line_gives_at_most_one_return() {
    let app = TestApp::new().await;
    let ncr = app
        .create_ncr(ncr_payload(
            "NCR-090",
            "2024-03-01",
            &[("J-1", "INV-61"), ("J-2", "INV-62")],
        ))
        .await;
    let id = ncr["id"].as_str().unwrap();
    let line = |index: usize| format!("/api/v1/ncr/{}/items/{}/return", id, index);

    assert_eq!(app.as_manager(Method::POST, &line(0), None).await.status(), 200);
    assert_eq!(app.as_manager(Method::POST, &line(0), None).await.status(), 409);

    let draft = app
        .as_manager(
            Method::GET,
            &format!("/api/v1/ncr/{}/items/0/return-draft", id),
            None,
        )
        .await;
    assert_eq!(draft.status(), 409);

    assert_eq!(app.as_manager(Method::POST, &line(1), None).await.status(), 200);

    let returns = response_json(app.as_manager(Method::GET, "/api/v1/returns", None).await).await;
    let refs: Vec<&str> = returns["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["refNo"].as_str().unwrap())
        .collect();
    assert_eq!(refs.len(), 2);
    assert!(refs.contains(&"INV-61") && refs.contains(&"INV-62"));
}

#[tokio::test]
async fn failed_return_sync_does_not_fail_the_ncr_edit() {
    let store = Arc::new(FlakyStore::new());
    let app = TestApp::with_store(store.clone()).await;
    let ncr = app
        .create_ncr(ncr_payload(
            "NCR-100",
            "2024-03-01",
            &[("K-1", "INV-71"), ("K-2", "INV-72")],
        ))
        .await;
    let id = ncr["id"].as_str().unwrap();

    let mut return_ids = Vec::new();
    for index in 0..2 {
        let created = response_json(
            app.as_manager(
                Method::POST,
                &format!("/api/v1/ncr/{}/items/{}/return", id, index),
                None,
            )
            .await,
        )
        .await;
        return_ids.push(created["data"]["id"].as_str().unwrap().to_string());
    }
    store.fail_updates_for(&return_ids[0]);

    let mut items = ncr["items"].clone();
    items[0]["productName"] = json!("Renamed K-1");
    items[1]["productName"] = json!("Renamed K-2");
    let update = app
        .as_manager(
            Method::PATCH,
            &format!("/api/v1/ncr/{}", id),
            Some(json!({ "items": items })),
        )
        .await;
    assert_eq!(update.status(), 200);

    let body = response_json(update).await;
    assert_eq!(body["data"]["ncr"]["items"][0]["productName"], "Renamed K-1");
    assert_eq!(body["data"]["syncedReturns"], json!([return_ids[1].clone()]));

    for (return_id, name) in [(&return_ids[0], "Product K-1"), (&return_ids[1], "Renamed K-2")] {
        let record = response_json(
            app.as_manager(Method::GET, &format!("/api/v1/returns/{}", return_id), None)
                .await,
        )
        .await;
        assert_eq!(record["data"]["productName"], name, "product name of {}", return_id);
    }
}

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use stateset_rma::{
    auth::token_digest,
    config::{AppConfig, OperatorConfig},
    events,
    services::FixedClock,
    store::{Collection, Document, MemoryStore, RecordStore, Snapshot, StoreError},
    AppState,
};
use tokio::sync::watch;
use tower::ServiceExt;

pub const MANAGER_TOKEN: &str = "manager-token";
pub const WAREHOUSE_TOKEN: &str = "warehouse-token";
pub const CLERK_TOKEN: &str = "clerk-token";
pub const VIEWER_TOKEN: &str = "viewer-token";

/// Memory store that refuses updates to selected record ids.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_updates_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        record: Document,
    ) -> Result<(), StoreError> {
        self.inner.create(collection, id, record).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(id) {
            return Err(StoreError::Backend(format!("write to {} timed out", id)));
        }
        self.inner.update(collection, id, fields).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        self.inner.list(collection).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn subscribe(
        &self,
        collection: Collection,
    ) -> Result<watch::Receiver<Snapshot>, StoreError> {
        self.inner.subscribe(collection).await
    }
}

/// Router over an in-memory store, a fixed clock and four operators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

fn operator(name: &str, token: &str, role: &str) -> OperatorConfig {
    OperatorConfig {
        name: name.to_string(),
        token_sha256: token_digest(token),
        roles: vec![role.to_string()],
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn RecordStore>) -> Self {
        let mut cfg = AppConfig::new("127.0.0.1".to_string(), 18_080, "test".to_string());
        cfg.batch_max_selection = 50;
        cfg.company_name = "Acme Foods QC".to_string();
        cfg.operators = vec![
            operator("Malee", MANAGER_TOKEN, "qc_manager"),
            operator("Somchai", WAREHOUSE_TOKEN, "warehouse"),
            operator("Branch North", CLERK_TOKEN, "branch_clerk"),
            operator("Auditor", VIEWER_TOKEN, "viewer"),
        ];

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap(),
        ));
        let state = AppState::new(cfg, store, event_sender, clock);
        let router = stateset_rma::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request as the QC manager, who holds every capability.
    pub async fn as_manager(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(MANAGER_TOKEN)).await
    }

    /// Files a return through the API and answers its id.
    pub async fn file_return(&self, ref_no: &str, product_code: &str) -> String {
        let response = self
            .as_manager(
                Method::POST,
                "/api/v1/returns",
                Some(return_payload(ref_no, product_code)),
            )
            .await;
        assert_eq!(response.status(), 200, "return creation should succeed");
        let body = response_json(response).await;
        body["data"]["id"]
            .as_str()
            .expect("created return has an id")
            .to_string()
    }

    /// Drives a return from Requested to Graded with the given disposition.
    pub async fn graded_return(&self, ref_no: &str, disposition: &str) -> String {
        let id = self.file_return(ref_no, "P-100").await;
        let received = self
            .as_manager(Method::POST, &format!("/api/v1/returns/{}/receive", id), None)
            .await;
        assert_eq!(received.status(), 200);

        let graded = self
            .as_manager(
                Method::POST,
                &format!("/api/v1/returns/{}/grade", id),
                Some(grade_payload(disposition)),
            )
            .await;
        assert_eq!(graded.status(), 200);
        id
    }

    pub async fn create_ncr(&self, payload: Value) -> Value {
        let response = self
            .as_manager(Method::POST, "/api/v1/ncr", Some(payload))
            .await;
        assert_eq!(response.status(), 200, "NCR creation should succeed");
        response_json(response).await["data"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 response")
}

pub fn return_payload(ref_no: &str, product_code: &str) -> Value {
    json!({
        "branch": "North",
        "date": "2024-03-01",
        "refNo": ref_no,
        "productCode": product_code,
        "productName": "Chili Sauce 300ml",
        "customerName": "Siam Mart",
        "quantity": "12",
        "unit": "bottle",
        "priceBill": "35.50",
        "reason": "Leaking caps"
    })
}

pub fn grade_payload(disposition: &str) -> Value {
    let mut payload = json!({
        "condition": "Damaged",
        "disposition": disposition,
    });
    let detail = match disposition {
        "RTV" => Some(("dispositionRoute", "Route 7")),
        "Restock" => Some(("sellerName", "Outlet Bangna")),
        "InternalUse" => Some(("internalUseDetail", "Canteen")),
        "Claim" => Some(("claimCompany", "Thai Insure")),
        _ => None,
    };
    if let Some((key, value)) = detail {
        payload[key] = json!(value);
    }
    payload
}

/// NCR form with one line per `(product_code, ref_no)` pair.
pub fn ncr_payload(ncr_no: &str, date: &str, items: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|(code, ref_no)| {
            json!({
                "productCode": code,
                "productName": format!("Product {}", code),
                "customerName": "Siam Mart",
                "branch": "North",
                "destinationCustomer": "DC Wangnoi",
                "quantity": "4",
                "unit": "carton",
                "priceBill": "120",
                "problemSource": "Supplier packing",
                "refNo": ref_no,
            })
        })
        .collect();

    json!({
        "ncrNo": ncr_no,
        "date": date,
        "toDept": "Purchasing",
        "problemDetail": "Crushed cartons",
        "problemDamaged": true,
        "actionReject": true,
        "actionRejectQty": "4",
        "items": items,
    })
}

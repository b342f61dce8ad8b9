use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseBackend, NotSet, Set, Statement};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app,
    config::AppConfig,
    db,
    entities::{customer_address, product_variant},
    events::{process_events, EventSender},
    gateway::MockGateway,
    AppState,
};

pub const TEST_CALLBACK_TOKEN: &str = "test-callback-token-32chars-long";

/// Harness spinning up the full router against a file-backed SQLite
/// database. Each instance gets its own database file so tests can run in
/// parallel.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    db_file: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file =
            std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4().simple()));
        let _ = std::fs::remove_file(&db_file);

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            TEST_CALLBACK_TOKEN.to_string(),
            0,
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");

        // Fresh schema per instance; the file is new but stale runs may
        // have left one behind under the same inode on some platforms.
        for sql in [
            "DROP TABLE IF EXISTS payment_webhook_events;",
            "DROP TABLE IF EXISTS payments;",
            "DROP TABLE IF EXISTS order_items;",
            "DROP TABLE IF EXISTS orders;",
            "DROP TABLE IF EXISTS checkout_session_items;",
            "DROP TABLE IF EXISTS checkout_sessions;",
            "DROP TABLE IF EXISTS customer_addresses;",
            "DROP TABLE IF EXISTS product_variants;",
        ] {
            let _ = pool
                .execute(Statement::from_string(
                    DatabaseBackend::Sqlite,
                    sql.to_string(),
                ))
                .await;
        }

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(process_events(event_rx));

        let config = Arc::new(cfg);
        let services = storefront_api::build_services(
            db_arc.clone(),
            &config,
            Arc::new(MockGateway),
            event_sender,
        );
        let state = AppState {
            db: db_arc,
            config,
            services,
        };

        Self {
            router: app(state.clone()),
            state,
            db_file,
            _event_task: event_task,
        }
    }

    /// Send a request with arbitrary headers; JSON bodies get the right
    /// content type.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
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

    pub async fn request_as_user(
        &self,
        user_id: i64,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let uid = user_id.to_string();
        self.request(method, uri, &[("x-user-id", uid.as_str())], body)
            .await
    }

    #[allow(dead_code)]
    pub async fn request_as_guest(
        &self,
        guest_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let gid = guest_id.to_string();
        self.request(method, uri, &[("x-guest-id", gid.as_str())], body)
            .await
    }

    #[allow(dead_code)]
    pub async fn request_as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(
            method,
            uri,
            &[("x-user-id", "1"), ("x-role", "admin")],
            body,
        )
        .await
    }

    /// Deliver a provider webhook with the given callback token.
    #[allow(dead_code)]
    pub async fn deliver_webhook(&self, token: &str, body: Value) -> axum::response::Response {
        self.request(
            Method::POST,
            "/api/v1/payments/webhook",
            &[("x-callback-token", token)],
            Some(body),
        )
        .await
    }

    pub async fn seed_variant(&self, sku: &str, price: i64, stock: i32) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            product_name: Set(format!("Test Product {sku}")),
            name: Set(format!("Variant {sku}")),
            price: Set(price),
            stock: Set(stock),
            quantity_unit: Set("pcs".to_string()),
            image_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product variant for tests")
    }

    pub async fn seed_address_for_user(&self, user_id: i64, city: &str) -> customer_address::Model {
        self.seed_address(Some(user_id), None, city).await
    }

    #[allow(dead_code)]
    pub async fn seed_address_for_guest(
        &self,
        guest_id: Uuid,
        city: &str,
    ) -> customer_address::Model {
        self.seed_address(None, Some(guest_id), city).await
    }

    async fn seed_address(
        &self,
        user_id: Option<i64>,
        guest_id: Option<Uuid>,
        city: &str,
    ) -> customer_address::Model {
        let now = Utc::now();
        customer_address::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            guest_id: Set(guest_id),
            recipient: Set("Test Recipient".to_string()),
            phone: Set("+628123456789".to_string()),
            street: Set("Jl. Test No. 1".to_string()),
            city: Set(city.to_string()),
            province: Set("DKI Jakarta".to_string()),
            postal_code: Set("12345".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Collect a response body into JSON, asserting the expected status first.
pub async fn json_body(response: axum::response::Response, expected: StatusCode) -> Value {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    assert_eq!(
        status,
        expected,
        "unexpected status, body: {}",
        String::from_utf8_lossy(&bytes)
    );
    serde_json::from_slice(&bytes).expect("response body is json")
}

//! Shared test harness for integration tests.
//!
//! [`TestApp::spawn`] builds a fresh SQLite database and object directory in
//! a tempdir, wires the real services around a [`FlakyObjectStore`] and
//! serves the router on a random port.

#![allow(dead_code)]

use bytes::Bytes;
use media_catalog::{
    config::{AppConfig, Args},
    db, routes,
    services::object_store::{LocalObjectStore, ObjectFuture, ObjectStore, ObjectStoreError},
    state::AppState,
};
use reqwest::{Response, header};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png-but-close-enough";

/// Local disk store with switchable failures and an optional delete delay.
pub struct FlakyObjectStore {
    pub inner: Arc<LocalObjectStore>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    delete_delay_ms: AtomicU64,
}

impl FlakyObjectStore {
    pub fn new(inner: Arc<LocalObjectStore>) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            delete_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_deletes(&self, delay: Duration) {
        self.delete_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl ObjectStore for FlakyObjectStore {
    fn put(&self, key: &str, data: Bytes, content_type: &str) -> ObjectFuture<'_, ()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err::<(), _>(ObjectStoreError::Unavailable("injected put failure".into()))
            });
        }
        self.inner.put(key, data, content_type)
    }

    fn delete(&self, key: &str) -> ObjectFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let delay = self.delete_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(ObjectStoreError::Unavailable("injected delete failure".into()));
            }
            self.inner.delete(&key).await
        })
    }

    fn signed_read_url(&self, key: &str, ttl: Duration) -> ObjectFuture<'_, String> {
        self.inner.signed_read_url(key, ttl)
    }

    fn exists(&self, key: &str) -> ObjectFuture<'_, bool> {
        self.inner.exists(key)
    }

    fn backend(&self) -> &'static str {
        "flaky-local"
    }
}

/// Cookies captured from `Set-Cookie` headers, replayed by hand.
#[derive(Debug, Default, Clone)]
pub struct Session {
    cookies: HashMap<String, String>,
}

impl Session {
    /// Apply every `Set-Cookie` on `resp`; empty values delete the cookie.
    pub fn absorb(&mut self, resp: &Response) {
        for value in resp.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else { continue };
            if value.is_empty() {
                self.cookies.remove(name.trim());
            } else {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub store: Arc<FlakyObjectStore>,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Start a server with extra `CATALOG_*` settings layered over the
    /// test defaults.
    pub async fn spawn_with(extra: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        let base = format!("http://{}", addr);

        let mut env: HashMap<String, String> = [
            ("CATALOG_ACCESS_SECRET", "test-access-secret"),
            ("CATALOG_REFRESH_SECRET", "test-refresh-secret"),
            ("CATALOG_URL_SIGNING_SECRET", "test-url-secret"),
            ("CATALOG_MAX_CONNECTIONS", "5"),
            ("CATALOG_MIN_CONNECTIONS", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        env.insert(
            "CATALOG_DATABASE_URL".into(),
            format!("sqlite://{}", dir.path().join("catalog.db").display()),
        );
        env.insert(
            "CATALOG_STORAGE_DIR".into(),
            dir.path().join("objects").display().to_string(),
        );
        env.insert("CATALOG_PUBLIC_BASE_URL".into(), base.clone());
        for (k, v) in extra {
            env.insert(k.to_string(), v.to_string());
        }

        let cfg = AppConfig::from_sources(Args::default(), |name| env.get(name).cloned())
            .expect("test config");
        let pool = db::connect(&cfg.database_url, cfg.max_connections, cfg.min_connections)
            .await
            .expect("connect");
        db::run_migrations(&pool).await.expect("migrations");

        let local = Arc::new(LocalObjectStore::new(
            cfg.storage_dir.clone(),
            cfg.public_base_url.clone(),
            cfg.url_signing_secret.expose(),
        ));
        let store = Arc::new(FlakyObjectStore::new(local.clone()));
        let state = AppState::new(&cfg, pool, store.clone(), Some(local));
        let app = routes::routes::routes(state.clone(), cfg.max_upload_bytes);

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base,
            client: reqwest::Client::new(),
            state,
            store,
            dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/create"))
            .json(&serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .expect("create request")
    }

    pub async fn login(&self, username: &str, password: &str) -> (Response, Session) {
        let resp = self
            .client
            .post(self.url("/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request");
        let mut session = Session::default();
        session.absorb(&resp);
        (resp, session)
    }

    /// Register and sign in `alice`.
    pub async fn signed_in(&self) -> Session {
        let resp = self.register("alice", "a@x.io", "secret1").await;
        assert_eq!(resp.status(), 201);
        let (resp, session) = self.login("alice", "secret1").await;
        assert_eq!(resp.status(), 200);
        session
    }

    pub async fn upload(
        &self,
        session: &Session,
        name: &str,
        category_id: &str,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Response {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .expect("mime");
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("name", name.to_string())
            .text("category_id", category_id.to_string())
            .text("description", format!("{} description", name));
        self.client
            .post(self.url("/imgupl"))
            .header(header::COOKIE, session.header())
            .multipart(form)
            .send()
            .await
            .expect("upload request")
    }

    /// Upload a PNG into category 1 and return `(id, object_key)`.
    pub async fn upload_png(&self, session: &Session, name: &str) -> (i64, String) {
        let resp = self
            .upload(session, name, "1", "photo.png", "image/png", PNG_BYTES)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.expect("upload body");
        (
            body["id"].as_i64().expect("id"),
            body["object_key"].as_str().expect("object_key").to_string(),
        )
    }

    pub async fn get(&self, session: &Session, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header(header::COOKIE, session.header())
            .send()
            .await
            .expect("get request")
    }

    pub async fn delete(&self, session: &Session, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .header(header::COOKIE, session.header())
            .send()
            .await
            .expect("delete request")
    }

    pub async fn update_form(&self, session: &Session, id: i64, fields: &[(&str, &str)]) -> Response {
        self.client
            .put(self.url(&format!("/imgupd/{}", id)))
            .header(header::COOKIE, session.header())
            .form(fields)
            .send()
            .await
            .expect("update request")
    }

    pub async fn object_exists(&self, key: &str) -> bool {
        self.store.inner.exists(key).await.expect("exists")
    }

    pub async fn image_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM images")
            .fetch_one(&*self.state.assets.metadata().db)
            .await
            .expect("count images")
    }
}

// In-process stand-in for the game API, served over real HTTP on an
// ephemeral port so the reqwest client is exercised end to end.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use farmgate::cache::QueryCache;
use farmgate::config::{ClientConfig, Routes};
use farmgate::net::api::ApiClient;
use farmgate::session::SessionManager;
use farmgate::signal::{self, SignalReceiver};
use farmgate::storage::{CredentialStore, MemoryStore};
use serde::Deserialize;
use serde_json::{Value, json};

type Reply = (StatusCode, Json<Value>);

pub struct MockApi {
    pub base_url: String,
    backend: Arc<Backend>,
}

#[derive(Default)]
struct Backend {
    validate_calls: AtomicUsize,
    login_calls: AtomicUsize,
    player_calls: AtomicUsize,
    next_id: AtomicI64,
    validate_delay: Mutex<Duration>,
    /// token -> user JSON returned by `/auth/validate`
    tokens: Mutex<HashMap<String, Value>>,
    expired: Mutex<Vec<String>>,
    /// email -> (password, token)
    accounts: Mutex<HashMap<String, (String, String)>>,
    /// "<user_id>/<resource>" -> stored JSON
    resources: Mutex<HashMap<String, Value>>,
}

impl MockApi {
    pub async fn start() -> Self {
        let backend = Arc::new(Backend { next_id: AtomicI64::new(100), ..Backend::default() });
        let app = Router::new()
            .route("/auth/validate", get(validate))
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/players/{user_id}/{resource}", get(read_resource).post(create_resource).put(replace_resource))
            .route("/players/{user_id}/{resource}/{item_id}", put(overwrite_item))
            .with_state(Arc::clone(&backend));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral test port");
        let addr = listener.local_addr().expect("get local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock api failed");
        });

        Self { base_url: format!("http://{addr}"), backend }
    }

    /// Register a bearer token that validates as the given user.
    pub fn add_user(&self, token: &str, id: i64, email: &str, player_id: Option<i64>) {
        self.backend
            .tokens
            .lock()
            .unwrap()
            .insert(token.to_owned(), json!({ "id": id, "email": email, "player_id": player_id }));
    }

    /// Register login credentials that yield `token`, which must already be added.
    pub fn add_account(&self, email: &str, password: &str, token: &str) {
        self.backend
            .accounts
            .lock()
            .unwrap()
            .insert(email.to_owned(), (password.to_owned(), token.to_owned()));
    }

    pub fn expire(&self, token: &str) {
        self.backend.expired.lock().unwrap().push(token.to_owned());
    }

    pub fn revoke(&self, token: &str) {
        self.backend.tokens.lock().unwrap().remove(token);
    }

    pub fn set_validate_delay(&self, delay: Duration) {
        *self.backend.validate_delay.lock().unwrap() = delay;
    }

    pub fn validate_calls(&self) -> usize {
        self.backend.validate_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.backend.login_calls.load(Ordering::SeqCst)
    }

    pub fn player_calls(&self) -> usize {
        self.backend.player_calls.load(Ordering::SeqCst)
    }

    pub fn resource(&self, user_id: i64, name: &str) -> Option<Value> {
        self.backend.resources.lock().unwrap().get(&format!("{user_id}/{name}")).cloned()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig { api_base_url: self.base_url.clone(), ..ClientConfig::default() }
    }
}

/// A session wired to the mock the way the binary wires it.
pub struct Client {
    pub store: Arc<dyn CredentialStore>,
    pub api: Arc<ApiClient>,
    pub cache: Arc<QueryCache>,
    pub session: Arc<SessionManager>,
    pub signals: SignalReceiver,
}

impl Client {
    pub fn new(mock: &MockApi, store: MemoryStore) -> Self {
        let store: Arc<dyn CredentialStore> = Arc::new(store);
        let (tx, signals) = signal::channel();
        let api = Arc::new(ApiClient::new(&mock.config(), Arc::clone(&store)).unwrap().with_signals(tx));
        let cache = Arc::new(QueryCache::new());
        let session = Arc::new(SessionManager::new(
            api.clone(),
            Arc::clone(&store),
            Arc::clone(&cache),
            Routes::default(),
        ));
        Self { store, api, cache, session, signals }
    }
}

// =============================================================
// handlers
// =============================================================

fn detail(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "detail": message })))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

impl Backend {
    fn authorize(&self, headers: &HeaderMap) -> Result<Value, Reply> {
        let Some(token) = bearer(headers) else {
            return Err(detail(StatusCode::UNAUTHORIZED, "Not authenticated"));
        };
        if self.expired.lock().unwrap().contains(&token) {
            return Err(detail(StatusCode::UNAUTHORIZED, "Token inválido ou expirado"));
        }
        self.tokens
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }
}

async fn validate(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Reply {
    backend.validate_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *backend.validate_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    match backend.authorize(&headers) {
        Ok(mut user) => {
            user["status"] = json!("valid");
            (StatusCode::OK, Json(user))
        }
        Err(reply) => reply,
    }
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(backend): State<Arc<Backend>>, Form(form): Form<LoginForm>) -> Reply {
    backend.login_calls.fetch_add(1, Ordering::SeqCst);
    let accounts = backend.accounts.lock().unwrap();
    match accounts.get(&form.username) {
        Some((password, token)) if *password == form.password => {
            let player_id = backend
                .tokens
                .lock()
                .unwrap()
                .get(token)
                .map_or(Value::Null, |user| user["player_id"].clone());
            (
                StatusCode::OK,
                Json(json!({ "access_token": token, "token_type": "bearer", "player_id": player_id })),
            )
        }
        _ => detail(StatusCode::UNAUTHORIZED, "Incorrect email or password"),
    }
}

async fn register(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    let mut accounts = backend.accounts.lock().unwrap();
    if accounts.contains_key(&email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
    let token = format!("token-{id}");
    backend
        .tokens
        .lock()
        .unwrap()
        .insert(token.clone(), json!({ "id": id, "email": email, "player_id": null }));
    accounts.insert(email.clone(), (password, token));
    (StatusCode::CREATED, Json(json!({ "id": id, "email": email })))
}

fn is_list(resource: &str) -> bool {
    matches!(resource, "characters" | "saves")
}

async fn read_resource(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((user_id, resource)): Path<(i64, String)>,
) -> Reply {
    backend.player_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(reply) = backend.authorize(&headers) {
        return reply;
    }
    let stored = backend.resources.lock().unwrap().get(&format!("{user_id}/{resource}")).cloned();
    match stored {
        Some(value) => (StatusCode::OK, Json(value)),
        None if is_list(&resource) => (StatusCode::OK, Json(json!([]))),
        None => detail(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn create_resource(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((user_id, resource)): Path<(i64, String)>,
    Json(mut body): Json<Value>,
) -> Reply {
    backend.player_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(reply) = backend.authorize(&headers) {
        return reply;
    }
    body["id"] = json!(backend.next_id.fetch_add(1, Ordering::SeqCst));
    let key = format!("{user_id}/{resource}");
    let mut resources = backend.resources.lock().unwrap();
    if is_list(&resource) {
        let list = resources.entry(key).or_insert_with(|| json!([]));
        if let Some(items) = list.as_array_mut() {
            items.push(body.clone());
        }
    } else {
        resources.insert(key, body.clone());
    }
    (StatusCode::CREATED, Json(body))
}

async fn replace_resource(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((user_id, resource)): Path<(i64, String)>,
    Json(body): Json<Value>,
) -> Reply {
    backend.player_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(reply) = backend.authorize(&headers) {
        return reply;
    }
    backend
        .resources
        .lock()
        .unwrap()
        .insert(format!("{user_id}/{resource}"), body.clone());
    (StatusCode::OK, Json(body))
}

async fn overwrite_item(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((user_id, resource, item_id)): Path<(i64, String, i64)>,
    Json(body): Json<Value>,
) -> Reply {
    backend.player_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(reply) = backend.authorize(&headers) {
        return reply;
    }
    let mut resources = backend.resources.lock().unwrap();
    let slot = resources
        .get_mut(&format!("{user_id}/{resource}"))
        .and_then(Value::as_array_mut)
        .and_then(|items| items.iter_mut().find(|item| item["id"] == json!(item_id)));
    match slot {
        Some(item) => {
            *item = body.clone();
            (StatusCode::OK, Json(body))
        }
        None => detail(StatusCode::NOT_FOUND, "Not found"),
    }
}

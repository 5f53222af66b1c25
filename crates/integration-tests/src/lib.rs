//! Integration tests for the Willys agent.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p willys-integration-tests
//! ```
//!
//! Tests run against [`FakeWillys`], an in-process store double on
//! `127.0.0.1` that speaks the endpoints the client uses: cookie-seeded
//! sessions, direct login, CSRF tokens, search, cart, delivery and slots.
//! Knobs on [`FakeState`] make it expire sessions, rotate tokens or reject
//! everything so the re-authentication paths can be exercised.
//!
//! # Test Categories
//!
//! - `session` - Token caching, refresh and re-authentication
//! - `auth` - Login and bootstrap
//! - `shopping` - Search, cart and delivery operations
//! - `mcp` - Tool dispatch against a live session

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{Json, Router};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{Days, Local, NaiveTime, TimeZone};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use willys_client::{Credentials, HttpLoginBootstrap, WillysClient};

pub const USERNAME: &str = "19900101-1234";
pub const PASSWORD: &str = "hunter22";
pub const DELIVERABLE_POSTAL_CODE: &str = "11151";

const SESSION_COOKIE: &str = "JSESSIONID";
const CSRF_HEADER: &str = "x-csrf-token";

// =============================================================================
// State
// =============================================================================

/// Shape of the CSRF token body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    /// `"tok-1"`
    Bare,
    /// `{"token": "tok-1"}`
    Wrapped,
    /// `""`
    Empty,
}

/// A request as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path and query.
    pub uri: String,
    pub csrf_token: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    price: f64,
    product: Value,
}

/// Observable and tweakable store state.
pub struct FakeState {
    pub csrf_fetches: AtomicUsize,
    pub logins: AtomicUsize,
    pub failed_logins: AtomicUsize,
    /// Delay before answering a token request, in milliseconds.
    pub token_delay_ms: AtomicU64,
    /// Reject every protected request, even right after a login.
    pub always_unauthorized: AtomicBool,
    /// Deliverability answer; `false` also makes the endpoint answer 200.
    pub deliverable: AtomicBool,
    token_shape: Mutex<TokenShape>,
    login_outage: Mutex<Option<String>>,
    current_token: Mutex<Option<String>>,
    next_session: AtomicUsize,
    authenticated: Mutex<HashSet<String>>,
    catalog: BTreeMap<String, CatalogEntry>,
    cart: Mutex<BTreeMap<String, u32>>,
    slots: Vec<Value>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeState {
    fn new() -> Self {
        Self {
            csrf_fetches: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            failed_logins: AtomicUsize::new(0),
            token_delay_ms: AtomicU64::new(0),
            always_unauthorized: AtomicBool::new(false),
            deliverable: AtomicBool::new(true),
            token_shape: Mutex::new(TokenShape::Bare),
            login_outage: Mutex::new(None),
            current_token: Mutex::new(None),
            next_session: AtomicUsize::new(1),
            authenticated: Mutex::new(HashSet::new()),
            catalog: catalog(),
            cart: Mutex::new(BTreeMap::new()),
            slots: slots(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_token_shape(&self, shape: TokenShape) {
        *lock(&self.token_shape) = shape;
    }

    pub fn set_token_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.token_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Answer every login with 500 and `body`; `None` restores normal logins.
    pub fn set_login_outage(&self, body: Option<&str>) {
        *lock(&self.login_outage) = body.map(ToString::to_string);
    }

    /// Invalidate the issued token without touching the session.
    pub fn rotate_token(&self) {
        *lock(&self.current_token) = Some("rotated".to_string());
    }

    /// Log every session out; only a new login fixes it.
    pub fn expire_sessions(&self) {
        lock(&self.authenticated).clear();
    }

    /// Put a product straight into the cart.
    pub fn seed_cart(&self, code: &str, quantity: u32) {
        lock(&self.cart).insert(code.to_string(), quantity);
    }

    #[must_use]
    pub fn cart_quantity(&self, code: &str) -> Option<u32> {
        lock(&self.cart).get(code).copied()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Recorded requests whose path starts with `prefix`.
    #[must_use]
    pub fn requests_to(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.uri.starts_with(prefix))
            .collect()
    }

    /// The slot listing as served, for comparing echoed routing fields.
    #[must_use]
    pub fn slot_listing(&self) -> &[Value] {
        &self.slots
    }

    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
        let csrf_token = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = (!body.is_empty())
            .then(|| serde_json::from_slice(body).ok())
            .flatten();
        lock(&self.requests).push(RecordedRequest {
            method: method.clone(),
            uri: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
            csrf_token,
            body,
        });
    }

    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        session_id(headers).is_some_and(|id| lock(&self.authenticated).contains(&id))
    }

    /// Protected requests need a logged-in session and the current token.
    fn authorize(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        if self.always_unauthorized.load(Ordering::SeqCst) || !self.is_authenticated(headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let sent = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
        let current = lock(&self.current_token).clone();
        match (sent, current) {
            (Some(sent), Some(current)) if sent == current => Ok(()),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    fn cart_json(&self) -> Value {
        let cart = lock(&self.cart);
        let mut total = 0.0;
        let products: Vec<Value> = cart
            .iter()
            .enumerate()
            .filter_map(|(i, (code, quantity))| {
                let entry = self.catalog.get(code)?;
                total += entry.price * f64::from(*quantity);
                // Cycle through the price shapes the real store mixes.
                let price = match i % 3 {
                    0 => json!(entry.price),
                    1 => json!(format!("{:.2}", entry.price)),
                    _ => json!({
                        "value": entry.price,
                        "formattedValue": format!("{:.2} kr", entry.price)
                    }),
                };
                Some(json!({
                    "code": code,
                    "name": entry.name,
                    "quantity": quantity,
                    "price": price,
                    "image": {"url": format!("https://assets.example.test/{code}.png")}
                }))
            })
            .collect();
        json!({
            "products": products,
            "totalPrice": format!("{total:.2}"),
            "deliveryFee": {"value": 49},
            "pickingFee": null
        })
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn product(
    code: &str,
    name: &str,
    price: f64,
    compare: &str,
    labels: &[&str],
    savings: Option<f64>,
) -> (String, CatalogEntry) {
    let product = json!({
        "code": code,
        "name": name,
        "priceValue": price,
        "price": format!("{price:.2} kr").replace('.', ","),
        "comparePrice": compare,
        "comparePriceUnit": "l",
        "displayVolume": "1l",
        "manufacturer": "Garant",
        "labels": labels,
        "online": true,
        "outOfStock": false,
        "savingsAmount": savings,
        "image": {"url": format!("https://assets.example.test/{code}.png")}
    });
    (
        code.to_string(),
        CatalogEntry {
            name: name.to_string(),
            price,
            product,
        },
    )
}

fn catalog() -> BTreeMap<String, CatalogEntry> {
    [
        product("101233933_ST", "Mellanmjölk 1,5%", 17.9, "17,90 kr", &["Svenskt"], None),
        product("100000001_ST", "Mjölk Laktosfri", 21.9, "21,90 kr", &[], None),
        product(
            "100000002_ST",
            "Mjölk Ekologisk",
            23.5,
            "23,50 kr",
            &["KRAV", "Ekologisk", "Svenskt"],
            Some(2.0),
        ),
        product("100000003_ST", "Mjölkdryck Havre", 26.9, "", &[], None),
        product("101205823_KG", "Bananer", 24.5, "24,50 kr", &["Ekologisk"], None),
    ]
    .into_iter()
    .collect()
}

/// Two slots tomorrow and one the day after, in local time. The middle one
/// is fully booked.
fn slots() -> Vec<Value> {
    let today = Local::now().date_naive();
    let windows = [(1, 15, 17, true), (1, 17, 19, false), (2, 8, 10, true)];
    windows
        .iter()
        .enumerate()
        .filter_map(|(i, (days, start, end, available))| {
            let date = today.checked_add_days(Days::new(*days))?;
            let at = |hour: u32| {
                NaiveTime::from_hms_opt(hour, 0, 0)
                    .and_then(|t| Local.from_local_datetime(&date.and_time(t)).earliest())
                    .map(|dt| dt.timestamp_millis())
            };
            let (start_ms, end_ms) = (at(*start)?, at(*end)?);
            Some(json!({
                "code": format!("{date}_{start:02}00_{end:02}00 HD"),
                "startTime": start_ms,
                "endTime": end_ms,
                "formattedTime": format!("{start:02}:00 - {end:02}:00"),
                "deliveryCost": {"value": 49.0},
                "available": available,
                "tmsDeliveryWindowReference": {
                    "earliestDateTime": start_ms,
                    "latestDateTime": end_ms,
                    "routeID": 300 + i,
                    "resourceKey": format!("RK-{i}"),
                    "scheduleKey": format!("SK-{days}"),
                    "precedingStopId": 10 + i,
                    "stopNumber": 11 + i,
                    "profitability": 0.25 + 0.25 * f64::from(u32::try_from(i).unwrap_or(0))
                }
            }))
        })
        .collect()
}

// =============================================================================
// Server
// =============================================================================

/// In-process store double. Shuts down when dropped.
pub struct FakeWillys {
    pub state: Arc<FakeState>,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl FakeWillys {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::new());
        let app = router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake store");
        let addr = listener.local_addr().expect("Failed to read local address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            state,
            addr,
            server,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A client holding the account credentials but no session yet.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> WillysClient {
        WillysClient::with_options(
            &self.base_url(),
            Duration::from_secs(5),
            Some(Credentials::new(USERNAME, PASSWORD)),
        )
        .expect("Failed to build client")
    }

    /// A client with an established session.
    ///
    /// # Panics
    ///
    /// Panics if the bootstrap fails.
    pub async fn logged_in_client(&self) -> WillysClient {
        let client = self.client();
        client
            .bootstrap(
                &HttpLoginBootstrap::new(Duration::from_secs(5)),
                USERNAME,
                &PASSWORD.to_string().into(),
            )
            .await
            .expect("Failed to bootstrap session");
        client
    }
}

impl Drop for FakeWillys {
    fn drop(&mut self) {
        self.server.abort();
    }
}

type AppState = Arc<FakeState>;

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(front_page))
        .route("/login", post(login))
        .route("/axfood/rest/csrf-token", get(csrf_token))
        .route("/axfood/rest/customer", get(customer))
        .route("/search", get(search))
        .route("/axfood/rest/cart", get(get_cart).delete(clear_cart))
        .route("/axfood/rest/cart/addProducts", post(add_products))
        .route("/axfood/rest/cart/delivery-mode/homeDelivery", post(accept_protected))
        .route("/axfood/rest/cart/delivery-address", post(accept_protected))
        .route("/axfood/rest/cart/postal-code", post(accept_protected_no_content))
        .route("/axfood/rest/slot/homeDelivery", get(list_slots))
        .route("/axfood/rest/slot/slotInCart/{slot_id}", post(select_slot))
        .route(
            "/axfood/rest/shipping/delivery/{postal_code}/deliverability",
            get(deliverability),
        )
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn front_page(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    if session_id(&headers).is_some() {
        return "<html>Willys</html>".into_response();
    }
    let id = format!("sess-{}", state.next_session.fetch_add(1, Ordering::SeqCst));
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly");
    let mut response = "<html>Willys</html>".into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body);
    if let Some(outage) = lock(&state.login_outage).clone() {
        return (StatusCode::INTERNAL_SERVER_ERROR, outage).into_response();
    }
    let Ok(credentials) = serde_json::from_slice::<LoginBody>(&body) else {
        return (StatusCode::BAD_REQUEST, "malformed login").into_response();
    };
    if credentials.username != USERNAME || credentials.password != PASSWORD {
        state.failed_logins.fetch_add(1, Ordering::SeqCst);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "no session cookie").into_response();
    };
    lock(&state.authenticated).insert(id);
    state.logins.fetch_add(1, Ordering::SeqCst);
    Json(json!({"success": true})).into_response()
}

async fn csrf_token(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    let delay = state.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let n = state.csrf_fetches.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("tok-{n}");
    *lock(&state.current_token) = Some(token.clone());

    match *lock(&state.token_shape) {
        TokenShape::Bare => Json(json!(token)).into_response(),
        TokenShape::Wrapped => Json(json!({ "token": token })).into_response(),
        TokenShape::Empty => Json(json!("")).into_response(),
    }
}

async fn customer(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.is_authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "customerId": "C-1001",
        "email": "anna@example.test",
        "firstName": "Anna",
        "lastName": "Svensson",
        "phoneNumber": null,
        "plusCustomer": true
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    size: Option<usize>,
}

async fn search(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    if query.page > 0 {
        return Json(json!({"results": []})).into_response();
    }
    let needle = query.q.to_lowercase();
    let results: Vec<&Value> = state
        .catalog
        .values()
        .filter(|entry| entry.name.to_lowercase().contains(&needle))
        .map(|entry| &entry.product)
        .take(query.size.unwrap_or(30))
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn get_cart(State(state): State<AppState>) -> Response {
    Json(state.cart_json()).into_response()
}

async fn clear_cart(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    lock(&state.cart).clear();
    StatusCode::NO_CONTENT.into_response()
}

async fn add_products(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body);
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    let Ok(body) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(line) = body["products"].as_array().and_then(|p| p.first()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let code = line["productCodePost"].as_str().unwrap_or_default().to_string();
    let qty = line["qty"]
        .as_u64()
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(0);
    if !state.catalog.contains_key(&code) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let mut cart = lock(&state.cart);
    if qty == 0 {
        cart.remove(&code);
    } else {
        cart.insert(code, qty);
    }
    Json(json!({"statusCode": "success"})).into_response()
}

async fn accept_protected(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body);
    match state.authorize(&headers) {
        Ok(()) => Json(json!({})).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn accept_protected_no_content(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body);
    match state.authorize(&headers) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(status) => status.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    postal_code: String,
}

async fn list_slots(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<SlotsQuery>,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    if query.postal_code != DELIVERABLE_POSTAL_CODE {
        return Json(json!({"isocode": "SE", "slots": []})).into_response();
    }
    Json(json!({"isocode": "SE", "slots": state.slots})).into_response()
}

async fn select_slot(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body);
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    let known = state
        .slots
        .iter()
        .any(|slot| slot["code"].as_str() == Some(slot_id.as_str()));
    if known {
        StatusCode::OK.into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

async fn deliverability(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(postal_code): Path<String>,
) -> Response {
    state.record(&method, &uri, &headers, &Bytes::new());
    if postal_code.len() != 5 {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let deliverable =
        state.deliverable.load(Ordering::SeqCst) && postal_code == DELIVERABLE_POSTAL_CODE;
    Json(json!({ "deliverable": deliverable })).into_response()
}

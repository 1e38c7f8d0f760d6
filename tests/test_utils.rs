//! A local stand-in for the Xero endpoints the downloader talks to.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use serde_json::{Value, json};
use time::macros::date;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use uuid::Uuid;
use warp::{Filter, Reply, http::StatusCode, reply::Response};

use xero_invoice_attachments::{
    ApiUrls, Client, KeyPair, Scope,
    config::Config,
    logging::{ledger_layer, open_log_file},
};

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
/// `Basic base64("client-id:client-secret")`
const BASIC_AUTH: &str = "Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=";
pub const ACCESS_TOKEN: &str = "mock-access-token";

pub const TENANT_ID: &str = "45e4708e-d862-4111-ab3a-dd8cd03913e1";
pub const OTHER_TENANT_ID: &str = "9a1c7e52-3b64-4f0d-8e21-5c6b7a8d9e0f";

pub const SUPPLIER_NAME: &str = "Acme Widgets Ltd";
pub const SUPPLIER_ID: &str = "bd2270c3-8706-4c11-9cfb-000b551c3f51";

pub const INVOICE_1: &str = "243216c5-369e-4056-ac67-05388f86dc81";
pub const INVOICE_2: &str = "7d0b3f3e-5a52-4b8e-9c55-7e8a2b6c1d40";
pub const INVOICE_3: &str = "c2f1e0d9-8b7a-4c6d-9e5f-4a3b2c1d0e9f";

/// An invoice as the API lists it, plus the files attached to it.
#[derive(Clone, Debug)]
pub struct MockInvoice {
    pub id: Uuid,
    pub json: Value,
    pub attachments: Vec<(String, Vec<u8>)>,
}

impl MockInvoice {
    pub fn new(id: &str, number: &str, date: &str, attachments: &[(&str, &[u8])]) -> Self {
        Self {
            id: Uuid::parse_str(id).unwrap(),
            json: json!({
                "Type": "ACCPAY",
                "InvoiceID": id,
                "InvoiceNumber": number,
                "DateString": format!("{date}T00:00:00"),
                "Status": "PAID",
                "CurrencyCode": "NZD",
                "Total": 115.00,
                "AmountDue": 0.00,
                "HasAttachments": !attachments.is_empty(),
            }),
            attachments: attachments
                .iter()
                .map(|(name, body)| ((*name).to_string(), body.to_vec()))
                .collect(),
        }
    }
}

/// What the mock serves, and what it has seen.
pub struct MockState {
    pub connections: Vec<Value>,
    pub invoices: Vec<MockInvoice>,
    pub page_size: usize,
    /// File names answered with a plain-text 500 until removed.
    pub failing_files: Mutex<HashSet<String>>,
    /// Invoices whose attachment listing is answered with a Xero error document.
    pub failing_listings: Mutex<HashSet<Uuid>>,
    /// Invoice page requests answered with a 429 before serving normally.
    pub rate_limited_pages: AtomicUsize,
    pub token_requests: Mutex<Vec<HashMap<String, String>>>,
    pub invoice_queries: Mutex<Vec<HashMap<String, String>>>,
    pub attachment_listings: AtomicUsize,
    pub downloads: Mutex<Vec<String>>,
}

impl MockState {
    pub fn new(invoices: Vec<MockInvoice>) -> Self {
        Self {
            connections: vec![
                connection("b1d7f6a0-4c2e-4f57-9c3b-2f1e0d9c8b7a", TENANT_ID, "Demo Company (NZ)"),
                connection("e4a5b6c7-d8e9-4f01-a2b3-c4d5e6f7a8b9", OTHER_TENANT_ID, "Other Org"),
            ],
            invoices,
            page_size: 2,
            failing_files: Mutex::default(),
            failing_listings: Mutex::default(),
            rate_limited_pages: AtomicUsize::new(0),
            token_requests: Mutex::default(),
            invoice_queries: Mutex::default(),
            attachment_listings: AtomicUsize::new(0),
            downloads: Mutex::default(),
        }
    }

    /// Three bills for the supplier: two files on the first, none on the
    /// second, and one with a slash in its name on an unnumbered third.
    pub fn supplier_bills() -> Self {
        Self::new(vec![
            MockInvoice::new(
                INVOICE_1,
                "INV-001",
                "2024-03-05",
                &[("Bill March.pdf", b"%PDF-1.4 march bill"), ("receipt.png", b"\x89PNG receipt")],
            ),
            MockInvoice::new(INVOICE_2, "INV-002", "2024-02-14", &[]),
            MockInvoice::new(INVOICE_3, "", "2024-01-20", &[("scan/1.jpg", b"\xff\xd8 scan")]),
        ])
    }

    pub fn without_connections(mut self) -> Self {
        self.connections.clear();
        self
    }

    pub fn fail_file(&self, name: &str) {
        self.failing_files.lock().unwrap().insert(name.to_string());
    }

    pub fn heal_file(&self, name: &str) {
        self.failing_files.lock().unwrap().remove(name);
    }

    pub fn fail_listing(&self, invoice_id: &str) {
        self.failing_listings
            .lock()
            .unwrap()
            .insert(Uuid::parse_str(invoice_id).unwrap());
    }

    pub fn heal_listing(&self, invoice_id: &str) {
        self.failing_listings
            .lock()
            .unwrap()
            .remove(&Uuid::parse_str(invoice_id).unwrap());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

fn connection(id: &str, tenant_id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "authEventId": "d99ecdfe-391d-43d2-b834-17636ba90e8d",
        "tenantId": tenant_id,
        "tenantType": "ORGANISATION",
        "tenantName": name,
        "createdDateUtc": "2019-07-09T23:40:30.1833130",
        "updatedDateUtc": "2020-05-15T01:35:13.8491980"
    })
}

fn problem(status: StatusCode, detail: &str) -> Response {
    warp::reply::with_status(
        warp::reply::json(&json!({
            "Type": null,
            "Title": status.canonical_reason().unwrap_or("Error"),
            "Status": status.as_u16(),
            "Detail": detail,
            "Instance": Uuid::new_v4().to_string(),
            "Extensions": {}
        })),
        status,
    )
    .into_response()
}

fn check_bearer(authorization: Option<&str>) -> Option<Response> {
    let expected = format!("Bearer {ACCESS_TOKEN}");
    (authorization != Some(expected.as_str()))
        .then(|| problem(StatusCode::UNAUTHORIZED, "TokenInvalid"))
}

fn check_accounting(authorization: Option<&str>, tenant: Option<&str>) -> Option<Response> {
    check_bearer(authorization).or_else(|| {
        (tenant != Some(TENANT_ID)).then(|| problem(StatusCode::FORBIDDEN, "AuthenticationUnsuccessful"))
    })
}

fn routes(
    state: Arc<MockState>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
    let authorization = || warp::header::optional::<String>("authorization");
    let tenant = || warp::header::optional::<String>("xero-tenant-id");

    let s = state.clone();
    let token = warp::post()
        .and(warp::path!("connect" / "token"))
        .and(authorization())
        .and(warp::body::form::<HashMap<String, String>>())
        .map(move |auth: Option<String>, form: HashMap<String, String>| -> Response {
            s.token_requests.lock().unwrap().push(form.clone());
            let grant = form.get("grant_type").map(String::as_str);
            if auth.as_deref() != Some(BASIC_AUTH) || grant != Some("client_credentials") {
                return warp::reply::with_status(
                    warp::reply::json(&json!({ "error": "invalid_client" })),
                    StatusCode::BAD_REQUEST,
                )
                .into_response();
            }
            warp::reply::json(&json!({
                "access_token": ACCESS_TOKEN,
                "token_type": "Bearer",
                "expires_in": 1800,
                "scope": form.get("scope").cloned().unwrap_or_default()
            }))
            .into_response()
        });

    let s = state.clone();
    let connections = warp::get()
        .and(warp::path!("connections"))
        .and(authorization())
        .map(move |auth: Option<String>| -> Response {
            if let Some(rejection) = check_bearer(auth.as_deref()) {
                return rejection;
            }
            warp::reply::json(&s.connections).into_response()
        });

    let contacts = warp::get()
        .and(warp::path!("api.xro" / "2.0" / "Contacts"))
        .and(authorization())
        .and(tenant())
        .and(warp::query::<HashMap<String, String>>())
        .map(
            move |auth: Option<String>, tenant: Option<String>, query: HashMap<String, String>| -> Response {
                if let Some(rejection) = check_accounting(auth.as_deref(), tenant.as_deref()) {
                    return rejection;
                }
                let wanted = format!("Name==\"{SUPPLIER_NAME}\"");
                let contacts = if query.get("where") == Some(&wanted) {
                    vec![json!({
                        "ContactID": SUPPLIER_ID,
                        "ContactStatus": "ACTIVE",
                        "Name": SUPPLIER_NAME,
                        "IsSupplier": true,
                        "IsCustomer": false
                    })]
                } else {
                    Vec::new()
                };
                warp::reply::json(&json!({ "Status": "OK", "Contacts": contacts })).into_response()
            },
        );

    let s = state.clone();
    let invoices = warp::get()
        .and(warp::path!("api.xro" / "2.0" / "Invoices"))
        .and(authorization())
        .and(tenant())
        .and(warp::query::<HashMap<String, String>>())
        .map(
            move |auth: Option<String>, tenant: Option<String>, query: HashMap<String, String>| -> Response {
                if let Some(rejection) = check_accounting(auth.as_deref(), tenant.as_deref()) {
                    return rejection;
                }
                s.invoice_queries.lock().unwrap().push(query.clone());

                let limited = s
                    .rate_limited_pages
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if limited {
                    let reply = warp::reply::with_status(
                        warp::reply::json(&json!({ "Title": "Too Many Requests" })),
                        StatusCode::TOO_MANY_REQUESTS,
                    );
                    let reply = warp::reply::with_header(reply, "Retry-After", "0");
                    return warp::reply::with_header(reply, "X-Rate-Limit-Problem", "minute").into_response();
                }

                let for_supplier = query
                    .get("where")
                    .is_some_and(|filter| filter.contains(SUPPLIER_ID));
                let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                let invoices: Vec<Value> = if for_supplier {
                    s.invoices
                        .iter()
                        .skip((page.max(1) - 1) * s.page_size)
                        .take(s.page_size)
                        .map(|invoice| invoice.json.clone())
                        .collect()
                } else {
                    Vec::new()
                };
                warp::reply::json(&json!({ "Status": "OK", "Invoices": invoices })).into_response()
            },
        );

    let s = state.clone();
    let attachment_list = warp::get()
        .and(warp::path!("api.xro" / "2.0" / "Invoices" / Uuid / "Attachments"))
        .and(authorization())
        .and(tenant())
        .map(
            move |invoice_id: Uuid, auth: Option<String>, tenant: Option<String>| -> Response {
                if let Some(rejection) = check_accounting(auth.as_deref(), tenant.as_deref()) {
                    return rejection;
                }
                s.attachment_listings.fetch_add(1, Ordering::SeqCst);
                if s.failing_listings.lock().unwrap().contains(&invoice_id) {
                    return warp::reply::with_status(
                        warp::reply::json(&json!({
                            "ErrorNumber": 23,
                            "Type": "InternalServerException",
                            "Message": "An unexpected error occurred"
                        })),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response();
                }
                let Some(invoice) = s.invoices.iter().find(|invoice| invoice.id == invoice_id) else {
                    return problem(StatusCode::NOT_FOUND, "Invoice not found");
                };
                let attachments: Vec<Value> = invoice
                    .attachments
                    .iter()
                    .map(|(name, body)| {
                        json!({
                            "AttachmentID": Uuid::new_v4(),
                            "FileName": name,
                            "MimeType": "application/octet-stream",
                            "ContentLength": body.len()
                        })
                    })
                    .collect();
                warp::reply::json(&json!({ "Status": "OK", "Attachments": attachments })).into_response()
            },
        );

    let s = state;
    let attachment_body = warp::get()
        .and(warp::path!("api.xro" / "2.0" / "Invoices" / Uuid / "Attachments" / String))
        .and(authorization())
        .and(tenant())
        .and(warp::header::optional::<String>("accept"))
        .map(
            move |invoice_id: Uuid,
                  file_name: String,
                  auth: Option<String>,
                  tenant: Option<String>,
                  accept: Option<String>|
                  -> Response {
                if let Some(rejection) = check_accounting(auth.as_deref(), tenant.as_deref()) {
                    return rejection;
                }
                if accept.as_deref() != Some("application/octet-stream") {
                    return problem(StatusCode::NOT_ACCEPTABLE, "Attachments are served as octet-stream");
                }
                // Path parameters arrive percent-encoded.
                let file_name = urlencoding::decode(&file_name).unwrap().into_owned();
                if s.failing_files.lock().unwrap().contains(&file_name) {
                    return warp::reply::with_status("upstream storage error", StatusCode::INTERNAL_SERVER_ERROR)
                        .into_response();
                }
                let body = s
                    .invoices
                    .iter()
                    .filter(|invoice| invoice.id == invoice_id)
                    .flat_map(|invoice| &invoice.attachments)
                    .find(|(name, _)| *name == file_name)
                    .map(|(_, body)| body.clone());
                match body {
                    Some(body) => {
                        s.downloads.lock().unwrap().push(file_name);
                        warp::reply::with_header(body, "content-type", "application/octet-stream").into_response()
                    }
                    None => problem(StatusCode::NOT_FOUND, "Attachment not found"),
                }
            },
        );

    token
        .or(connections)
        .unify()
        .or(contacts)
        .unify()
        .or(invoices)
        .unify()
        .or(attachment_list)
        .unify()
        .or(attachment_body)
        .unify()
}

/// A running mock server.
pub struct MockXero {
    pub port: u16,
    pub state: Arc<MockState>,
}

impl MockXero {
    pub async fn start(state: MockState) -> Self {
        let state = Arc::new(state);
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let filter = routes(state.clone());
        std::thread::spawn(move || {
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(warp::serve(filter).run(([127, 0, 0, 1], port)));
        });

        for _ in 0..100 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        info!(port, "mock Xero listening");
        Self { port, state }
    }

    pub fn urls(&self) -> ApiUrls {
        let root = format!("http://127.0.0.1:{}", self.port);
        ApiUrls::new(
            &format!("{root}/connect/token"),
            &format!("{root}/connections"),
            &format!("{root}/api.xro/2.0/"),
        )
        .unwrap()
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair::new(CLIENT_ID.to_string(), CLIENT_SECRET.to_string())
    }

    /// A client holding the mock token and tenant, without the token exchange.
    pub fn client(&self) -> Client {
        let mut client = Client::from_access_token(
            oauth2::AccessToken::new(ACCESS_TOKEN.to_string()),
            self.urls(),
        );
        client.set_tenant(Some(Uuid::parse_str(TENANT_ID).unwrap()));
        client
    }

    /// A run configuration pointing at this server, writing under `dir`.
    pub fn config(&self, dir: &Path) -> Config {
        Config {
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            supplier_name: SUPPLIER_NAME.to_string(),
            start_date: date!(2024 - 01 - 01),
            tenant_id: None,
            scopes: Scope::downloader_default(),
            output_dir: dir.join("invoice_attachments"),
            log_file: dir.join("xero_download.log"),
            request_delay: Duration::ZERO,
            dry_run: false,
            api_urls: self.urls(),
        }
    }
}

/// Routes this thread's events to the ledger file, as the binary does, and to
/// the test output.
pub fn ledger_subscriber(log_file: &Path) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(ledger_layer(open_log_file(log_file).unwrap()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
}

static LOGGING_CONFIGURED: Once = Once::new();

/// Setup before test runs
pub fn do_setup() {
    LOGGING_CONFIGURED.call_once(|| tracing_subscriber::fmt().with_test_writer().init());
    info!("Setting up test environment");
}

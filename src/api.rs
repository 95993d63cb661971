//! TPV backend API client.
//!
//! [`PosApi`] is the set of sale and catalog calls the session controller
//! depends on. [`HttpPosApi`] implements it over HTTP with a bearer token
//! taken from the credential store, and adds the calls the controller never
//! makes (login, sale history, cash closing).

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::ClientConfig;
use crate::error::{PosError, PosResult};
use crate::models::{
    CashClosing, Category, CreateSaleRequest, LineInput, LoginResponse, PaymentMethod, Product,
    Sale, SaleDestination, SaleId, Table, UpdateSaleRequest,
};
use crate::storage::{
    self, CredentialStore, KEY_ACCESS_TOKEN, KEY_TENANT_ID, KEY_USER_ROLE,
};

#[async_trait]
pub trait PosApi: Send + Sync {
    async fn list_products(&self) -> PosResult<Vec<Product>>;
    async fn list_categories(&self) -> PosResult<Vec<Category>>;
    async fn list_tables(&self) -> PosResult<Vec<Table>>;
    /// Sales with status OPEN.
    async fn list_active_sales(&self) -> PosResult<Vec<Sale>>;
    async fn get_sale(&self, sale_id: SaleId) -> PosResult<Sale>;
    /// Create an OPEN sale bound to a table or a free-text name.
    async fn open_sale(&self, destination: &SaleDestination) -> PosResult<Sale>;
    /// Replace the sale's whole line set.
    async fn update_sale_lines(&self, sale_id: SaleId, lines: &[LineInput]) -> PosResult<()>;
    async fn close_sale(&self, sale_id: SaleId, method: PaymentMethod) -> PosResult<Sale>;
    /// Create and close a walk-up sale in one call.
    async fn create_sale(&self, request: &CreateSaleRequest) -> PosResult<Sale>;
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> PosError {
    let message = if err.is_connect() {
        format!("Cannot reach the TPV backend at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid backend URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    PosError::Network(message)
}

/// Convert an HTTP status code into a user-friendly message.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please log in again".to_string(),
        403 => "Not allowed for this user".to_string(),
        404 => "Resource not found".to_string(),
        s if s >= 500 => format!("TPV backend server error (HTTP {s})"),
        s => format!("Unexpected response from the TPV backend (HTTP {s})"),
    }
}

/// Pull the backend's `detail` out of an error body. Validation failures
/// carry a list of problems instead of a string; those are kept as JSON.
fn error_detail(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    match json.get("detail")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn map_status(status: StatusCode, body: &str) -> PosError {
    let message = error_detail(body).unwrap_or_else(|| status_message(status));
    match status {
        StatusCode::UNAUTHORIZED => PosError::Unauthorized,
        StatusCode::NOT_FOUND => PosError::NotFound(message),
        _ => PosError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct HttpPosApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpPosApi {
    pub fn new(config: &ClientConfig, credentials: Arc<dyn CredentialStore>) -> PosResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PosError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.get(KEY_ACCESS_TOKEN).is_some()
    }

    /// Perform a request against the backend and decode its JSON body.
    ///
    /// `path` includes the leading slash, e.g. `/sales/active`. A 401 means
    /// the token expired: the stored session is cleared before returning
    /// [`PosError::Unauthorized`].
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> PosResult<T> {
        let full_url = format!("{}{path}", self.base_url);
        debug!(method = %method, path, "backend request");

        let mut req = self.client.request(method.clone(), &full_url);
        if let Some(token) = self.credentials.get(KEY_ACCESS_TOKEN) {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = match resp.text().await {
            Ok(text) => text,
            Err(e) if status.is_success() => return Err(friendly_error(&self.base_url, &e)),
            // Error statuses fall back to the generic status message.
            Err(_) => String::new(),
        };

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                warn!(path, "backend rejected the session token, clearing it");
                if let Err(e) = storage::clear_session(self.credentials.as_ref()) {
                    warn!(error = %e, "failed to clear expired session");
                }
            } else {
                warn!(method = %method, path, status = status.as_u16(), "backend request failed");
            }
            return Err(map_status(status, &body_text));
        }

        // Empty 204 bodies decode as JSON null.
        let payload = if body_text.trim().is_empty() {
            "null"
        } else {
            body_text.as_str()
        };
        serde_json::from_str(payload).map_err(|e| PosError::InvalidResponse(e.to_string()))
    }

    fn to_body<S: serde::Serialize>(value: &S) -> PosResult<Value> {
        serde_json::to_value(value).map_err(|e| PosError::InvalidResponse(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Log in and keep the returned token for subsequent calls.
    pub async fn login(&self, username: &str, password: Zeroizing<String>) -> PosResult<LoginResponse> {
        let body = serde_json::json!({
            "username": username,
            "password": password.as_str(),
        });
        let resp: LoginResponse = self.request(Method::POST, "/auth/login", Some(body)).await?;

        self.credentials.set(KEY_ACCESS_TOKEN, &resp.access_token)?;
        self.credentials.set(KEY_USER_ROLE, &resp.role)?;
        match resp.tenant_id.as_deref() {
            Some(tenant) => self.credentials.set(KEY_TENANT_ID, tenant)?,
            None => self.credentials.delete(KEY_TENANT_ID)?,
        }
        info!(username, role = %resp.role, "logged in");
        Ok(resp)
    }

    pub fn logout(&self) -> PosResult<()> {
        storage::clear_session(self.credentials.as_ref())
    }

    // -----------------------------------------------------------------------
    // History and cash closing
    // -----------------------------------------------------------------------

    pub async fn list_sales(&self) -> PosResult<Vec<Sale>> {
        self.request(Method::GET, "/sales/", None).await
    }

    /// Interim (X) closing report over the current sales.
    pub async fn cash_closing(&self) -> PosResult<CashClosing> {
        let report: CashClosing = self.request(Method::POST, "/cash-closing/", None).await?;
        info!(closing_id = report.id, total = report.total_total, "cash closing report generated");
        Ok(report)
    }

    /// Final (Z) closing: reports and deletes the period's sales.
    pub async fn close_and_purge_sales(&self) -> PosResult<CashClosing> {
        let report: CashClosing = self
            .request(Method::DELETE, "/cash-closing/sales", None)
            .await?;
        info!(
            closing_id = report.id,
            from_sales = report.from_sales,
            to_sales = report.to_sales,
            "final cash closing completed, sales purged"
        );
        Ok(report)
    }
}

#[async_trait]
impl PosApi for HttpPosApi {
    async fn list_products(&self) -> PosResult<Vec<Product>> {
        self.request(Method::GET, "/products/", None).await
    }

    async fn list_categories(&self) -> PosResult<Vec<Category>> {
        self.request(Method::GET, "/products/categories/", None).await
    }

    async fn list_tables(&self) -> PosResult<Vec<Table>> {
        self.request(Method::GET, "/tables/", None).await
    }

    async fn list_active_sales(&self) -> PosResult<Vec<Sale>> {
        self.request(Method::GET, "/sales/active", None).await
    }

    async fn get_sale(&self, sale_id: SaleId) -> PosResult<Sale> {
        self.request(Method::GET, &format!("/sales/{sale_id}"), None)
            .await
    }

    async fn open_sale(&self, destination: &SaleDestination) -> PosResult<Sale> {
        let body = Self::to_body(destination)?;
        self.request(Method::POST, "/sales/open", Some(body)).await
    }

    async fn update_sale_lines(&self, sale_id: SaleId, lines: &[LineInput]) -> PosResult<()> {
        let body = Self::to_body(&UpdateSaleRequest {
            lines: lines.to_vec(),
        })?;
        // The response echoes the sale; callers refetch it explicitly.
        let _: Value = self
            .request(Method::PUT, &format!("/sales/{sale_id}"), Some(body))
            .await?;
        Ok(())
    }

    async fn close_sale(&self, sale_id: SaleId, method: PaymentMethod) -> PosResult<Sale> {
        let path = format!("/sales/{sale_id}/close?payment_method={}", method.as_str());
        self.request(Method::POST, &path, None).await
    }

    async fn create_sale(&self, request: &CreateSaleRequest) -> PosResult<Sale> {
        let body = Self::to_body(request)?;
        self.request(Method::POST, "/sales/", Some(body)).await
    }
}

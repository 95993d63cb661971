//! Wire types for the TPV backend REST API.
//!
//! Field names follow the backend's snake_case JSON. Amounts are plain
//! `f64`; every total is computed server-side.

use serde::{Deserialize, Serialize};

pub type ProductId = i64;
pub type CategoryId = i64;
pub type TableId = i64;
pub type SaleId = i64;

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_string()
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaleStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// One line of a remote sale, priced by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    #[serde(default)]
    pub id: Option<i64>,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_unit: f64,
    pub line_total: f64,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub status: SaleStatus,
    /// Epoch seconds.
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub table_id: Option<TableId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lines: Vec<SaleLine>,
    #[serde(default)]
    pub creator: Option<User>,
    #[serde(default)]
    pub closer: Option<User>,
}

impl Sale {
    pub fn is_open(&self) -> bool {
        self.status == SaleStatus::Open
    }
}

/// Line payload for `PUT /sales/{id}` and `POST /sales/`. The server
/// resolves the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `POST /sales/open`: either a table or a free-text name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SaleDestination {
    Table { table_id: TableId },
    Named { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSaleRequest {
    pub lines: Vec<LineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSaleRequest {
    pub payment_method: PaymentMethod,
    pub lines: Vec<LineInput>,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Cash closing
// ---------------------------------------------------------------------------

/// `X` is an interim report; `Z` closes the period and purges its sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosingType {
    X,
    Z,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashClosing {
    pub id: i64,
    pub closing_type: ClosingType,
    pub user_id: i64,
    pub date: f64,
    pub from_date: f64,
    pub to_date: f64,
    pub from_sales: SaleId,
    pub to_sales: SaleId,
    pub total_sales: i64,
    pub total_cash: f64,
    pub total_card: f64,
    pub total_total: f64,
}

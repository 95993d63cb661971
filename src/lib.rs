//! TPV POS client.
//!
//! Client side of a point-of-sale system for small hospitality venues. The
//! heart of the crate is [`SaleController`], which keeps a locally edited
//! cart in step with the sale record held by the TPV backend while the user
//! opens, edits, moves and charges an order. Everything it needs from the
//! backend goes through the [`PosApi`] trait; [`HttpPosApi`] is the HTTP
//! implementation.

pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod storage;
pub mod view;

pub use api::{HttpPosApi, PosApi};
pub use config::ClientConfig;
pub use controller::SaleController;
pub use error::{PosError, PosResult};
pub use models::{PaymentMethod, Sale, SaleId};
pub use session::{Session, SessionMode};
pub use storage::{CredentialStore, KeyringStore, MemoryStore};
pub use view::{Notice, NoticeLevel, SessionView};

/// Navigation query parameter naming the sale to edit.
pub const SALE_ID_PARAM: &str = "sale_id";

/// Extract the sale to edit from a navigation query string such as
/// `?sale_id=41`. Missing or malformed values mean a fresh session.
pub fn parse_sale_id_param(query: &str) -> Option<SaleId> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == SALE_ID_PARAM)
        .and_then(|(_, value)| value.trim().parse::<SaleId>().ok())
        .filter(|id| *id > 0)
}

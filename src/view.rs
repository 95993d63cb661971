//! Display models derived from controller state.
//!
//! The controller publishes a [`SessionView`] after every state change and a
//! [`Notice`] for every user-facing outcome; a rendering surface subscribes
//! to both and never reads the session directly.

use chrono::{DateTime, Local, TimeZone};

use crate::cart::CartLine;
use crate::models::{CashClosing, Sale, SaleId, Table, TableId};
use crate::session::{Session, SessionMode};

pub const NO_TABLE_LABEL: &str = "No table";

pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}€")
}

fn table_label(table_id: TableId, tables: &[Table]) -> String {
    tables
        .iter()
        .find(|t| t.id == table_id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| format!("Table #{table_id}"))
}

/// Header text for the order being edited, e.g. `Terraza 2 (Ticket: 41)`.
pub fn ticket_header(sale: Option<&Sale>, sale_id: Option<SaleId>, tables: &[Table]) -> String {
    let base = match sale.and_then(|s| s.table_id) {
        Some(table_id) => table_label(table_id, tables),
        None => NO_TABLE_LABEL.to_string(),
    };
    match sale.map(|s| s.id).or(sale_id) {
        Some(id) => format!("{base} (Ticket: {id})"),
        None => base,
    }
}

// ---------------------------------------------------------------------------
// Session snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub mode: SessionMode,
    pub sale_id: Option<SaleId>,
    pub lines: Vec<CartLine>,
    pub selected: Option<usize>,
    pub numpad: String,
    /// Sum of local lines.
    pub cart_total: f64,
    /// Server total of the bound sale as last fetched.
    pub sale_total: Option<f64>,
    pub header: String,
}

impl SessionView {
    pub fn from_session(session: &Session, tables: &[Table]) -> Self {
        Self {
            mode: session.mode(),
            sale_id: session.sale_id(),
            lines: session.cart().lines().to_vec(),
            selected: session.selected(),
            numpad: session.numpad().to_string(),
            cart_total: session.cart().total(),
            sale_total: session.current_sale().map(|s| s.total),
            header: ticket_header(session.current_sale(), session.sale_id(), tables),
        }
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::from_session(&Session::default(), &[])
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Transient notification (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables and open orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TableStatus {
    Free,
    Occupied { sale_id: SaleId, total: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSlot {
    pub table: Table,
    pub status: TableStatus,
}

impl TableSlot {
    pub fn is_free(&self) -> bool {
        self.status == TableStatus::Free
    }

    pub fn occupying_sale(&self) -> Option<SaleId> {
        match self.status {
            TableStatus::Occupied { sale_id, .. } => Some(sale_id),
            TableStatus::Free => None,
        }
    }
}

/// One slot per table, occupied when an open sale is bound to it.
pub fn table_slots(tables: &[Table], active_sales: &[Sale]) -> Vec<TableSlot> {
    tables
        .iter()
        .map(|table| {
            let status = active_sales
                .iter()
                .find(|s| s.is_open() && s.table_id == Some(table.id))
                .map(|s| TableStatus::Occupied {
                    sale_id: s.id,
                    total: s.total,
                })
                .unwrap_or(TableStatus::Free);
            TableSlot {
                table: table.clone(),
                status,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub sale_id: SaleId,
    pub table_id: Option<TableId>,
    pub label: String,
    pub total: f64,
}

/// Open sales bound to a table, labelled by table name.
pub fn open_table_orders(active_sales: &[Sale], tables: &[Table]) -> Vec<OpenOrder> {
    active_sales
        .iter()
        .filter_map(|s| {
            let table_id = s.table_id?;
            Some(OpenOrder {
                sale_id: s.id,
                table_id: Some(table_id),
                label: table_label(table_id, tables),
                total: s.total,
            })
        })
        .collect()
}

/// Open sales without a table (takeaway / named orders).
pub fn other_open_orders(active_sales: &[Sale]) -> Vec<OpenOrder> {
    active_sales
        .iter()
        .filter(|s| s.table_id.is_none())
        .map(|s| OpenOrder {
            sale_id: s.id,
            table_id: None,
            label: s
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Order #{}", s.id)),
            total: s.total,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cash closing
// ---------------------------------------------------------------------------

fn format_epoch<Tz: TimeZone>(epoch_secs: f64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    DateTime::from_timestamp(epoch_secs.trunc() as i64, 0)
        .map(|dt| dt.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn closing_summary_in<Tz: TimeZone>(closing: &CashClosing, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "Closing ID: #{id}\n\
         Type:       {kind:?}\n\
         Date:       {date}\n\
         User:       {user}\n\
         \n\
         Cash:       {cash}\n\
         Card:       {card}\n\
         --- Totals ---\n\
         Sales:      {count} (#{from}-#{to})\n\
         Total:      {total}\n\
         ----------------",
        id = closing.id,
        kind = closing.closing_type,
        date = format_epoch(closing.date, tz),
        user = closing.user_id,
        cash = format_amount(closing.total_cash),
        card = format_amount(closing.total_card),
        count = closing.total_sales,
        from = closing.from_sales,
        to = closing.to_sales,
        total = format_amount(closing.total_total),
    )
}

/// Printable summary of a cash closing report, in local time.
pub fn cash_closing_summary(closing: &CashClosing) -> String {
    closing_summary_in(closing, &Local)
}

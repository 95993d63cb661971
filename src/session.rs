//! Pure session state: the order currently being built or edited.
//!
//! Nothing here performs I/O. [`crate::controller::SaleController`] owns a
//! `Session` and drives these transitions around its remote calls, so the
//! whole state machine can be exercised without a backend or a view.
//!
//! A session is either [`SessionMode::Direct`] (no remote sale yet; a
//! walk-up sale is created at payment time) or [`SessionMode::Attached`]
//! (bound to a remote sale id that receives every cart overwrite). The mode
//! is derived from the bound id so the two can never disagree.

use crate::cart::{Cart, CartLine, NumpadBuffer};
use crate::catalog::{Catalog, UNKNOWN_PRODUCT_NAME};
use crate::models::{LineInput, ProductId, Sale, SaleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Direct,
    Attached,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    cart: Cart,
    sale_id: Option<SaleId>,
    selected: Option<usize>,
    numpad: NumpadBuffer,
    current_sale: Option<Sale>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SessionMode {
        if self.sale_id.is_some() {
            SessionMode::Attached
        } else {
            SessionMode::Direct
        }
    }

    pub fn sale_id(&self) -> Option<SaleId> {
        self.sale_id
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn numpad(&self) -> &str {
        self.numpad.as_str()
    }

    /// Last sale fetched from the backend for the bound id.
    pub fn current_sale(&self) -> Option<&Sale> {
        self.current_sale.as_ref()
    }

    pub fn line_inputs(&self) -> Vec<LineInput> {
        self.cart.to_line_inputs()
    }

    // -----------------------------------------------------------------------
    // Cart edits
    // -----------------------------------------------------------------------

    /// Add one unit of a catalog product (or the pending keypad quantity).
    pub fn add_line(&mut self, catalog: &Catalog, product_id: ProductId) -> bool {
        self.add_line_with_quantity(catalog, product_id, 1)
    }

    /// Add `quantity` units of a catalog product. A pending keypad value
    /// replaces `quantity` and is consumed. Unknown products are ignored and
    /// leave the keypad untouched.
    pub fn add_line_with_quantity(
        &mut self,
        catalog: &Catalog,
        product_id: ProductId,
        quantity: u32,
    ) -> bool {
        let Some(product) = catalog.product(product_id) else {
            return false;
        };
        let quantity = if self.numpad.is_empty() {
            quantity
        } else {
            self.numpad.take().unwrap_or(quantity)
        };
        if quantity == 0 {
            return false;
        }
        self.cart
            .add(product.id, &product.name, product.price, quantity);
        true
    }

    /// Remove the line at `index`, keeping the selection on the same line
    /// when possible. Out-of-range indexes are a no-op.
    pub fn remove_line(&mut self, index: usize) -> bool {
        if self.cart.remove(index).is_none() {
            return false;
        }
        self.selected = match self.selected {
            Some(sel) if sel == index => None,
            Some(sel) if sel > index => Some(sel - 1),
            other => other,
        };
        true
    }

    pub fn remove_selected(&mut self) -> bool {
        match self.selected {
            Some(index) => self.remove_line(index),
            None => false,
        }
    }

    /// Select a line for a later quantity edit. Out-of-range is a no-op.
    pub fn select_line(&mut self, index: usize) -> bool {
        if index >= self.cart.len() {
            return false;
        }
        self.selected = Some(index);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    // TODO: apply keypad input to the selected line once quantity editing of
    // existing lines is designed; today selection is only tracked.
    pub fn numpad_input(&mut self, key: char) -> bool {
        self.numpad.press(key)
    }

    pub fn numpad_clear(&mut self) {
        self.numpad.clear();
    }

    // -----------------------------------------------------------------------
    // Identity transitions
    // -----------------------------------------------------------------------

    /// Bind the session to a remote sale (DIRECT -> ATTACHED, or rebind).
    pub fn attach(&mut self, sale_id: SaleId) {
        if self.sale_id != Some(sale_id) {
            self.current_sale = None;
        }
        self.sale_id = Some(sale_id);
    }

    /// Record a freshly fetched sale. Ignored when it is not the bound one,
    /// which happens when a response lands after the session moved on.
    pub fn set_current_sale(&mut self, sale: Sale) -> bool {
        if self.sale_id != Some(sale.id) {
            return false;
        }
        self.current_sale = Some(sale);
        true
    }

    /// Replace the cart with a remote sale's lines and bind to it.
    ///
    /// Lines resolve against the catalog; a product missing from the catalog
    /// keeps the server-recorded unit price under a placeholder name.
    pub fn load_sale(&mut self, catalog: &Catalog, sale: Sale) {
        let lines = sale.lines.iter().map(|line| match catalog.product(line.product_id) {
            Some(product) => CartLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity: line.quantity,
                unit_price: product.price,
            },
            None => CartLine {
                product_id: line.product_id,
                name: UNKNOWN_PRODUCT_NAME.to_string(),
                quantity: line.quantity,
                unit_price: line.price_unit,
            },
        });
        self.cart = Cart::from_lines(lines);
        self.selected = None;
        self.sale_id = Some(sale.id);
        self.current_sale = Some(sale);
    }

    /// Walk-up sale charged: empty the cart, stay DIRECT.
    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.selected = None;
        self.numpad.clear();
    }

    /// Back to a fresh DIRECT session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

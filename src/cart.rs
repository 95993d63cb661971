//! Client-held cart and the keypad quantity buffer.

use crate::models::{LineInput, ProductId};

/// Maximum number of digits the keypad buffer accepts.
pub const NUMPAD_MAX_DIGITS: usize = 5;

/// Key that empties the keypad buffer.
pub const NUMPAD_CLEAR_KEY: char = 'C';

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl CartLine {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Ordered cart lines, at most one per product.
///
/// Every line holds a quantity of at least one; zero-quantity additions are
/// dropped instead of being stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart from arbitrary lines, folding repeated products into one
    /// line and dropping empty ones. Order of first appearance is kept.
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            cart.add(line.product_id, &line.name, line.unit_price, line.quantity);
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&CartLine> {
        self.lines.get(index)
    }

    /// Add `quantity` units of a product, merging into its existing line.
    pub fn add(&mut self, product_id: ProductId, name: &str, unit_price: f64, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                product_id,
                name: name.to_string(),
                quantity,
                unit_price,
            }),
        }
    }

    /// Remove the line at `index`. Out-of-range indexes return `None`.
    pub fn remove(&mut self, index: usize) -> Option<CartLine> {
        if index < self.lines.len() {
            Some(self.lines.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Local display total. The backend recomputes the real one.
    pub fn total(&self) -> f64 {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Payload lines for a full overwrite of a remote sale.
    pub fn to_line_inputs(&self) -> Vec<LineInput> {
        self.lines
            .iter()
            .map(|l| LineInput {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect()
    }
}

/// Digits typed on the keypad, waiting to become the next line's quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumpadBuffer {
    digits: String,
}

impl NumpadBuffer {
    /// Feed one key. Digits are appended up to [`NUMPAD_MAX_DIGITS`],
    /// [`NUMPAD_CLEAR_KEY`] empties the buffer, anything else is ignored.
    /// Returns whether the buffer changed.
    pub fn press(&mut self, key: char) -> bool {
        if key.eq_ignore_ascii_case(&NUMPAD_CLEAR_KEY) {
            let changed = !self.digits.is_empty();
            self.digits.clear();
            return changed;
        }
        if key.is_ascii_digit() && self.digits.len() < NUMPAD_MAX_DIGITS {
            self.digits.push(key);
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// Consume the buffer. Yields `None` when it was empty or held only
    /// zeros; the buffer is reset either way.
    pub fn take(&mut self) -> Option<u32> {
        let digits = std::mem::take(&mut self.digits);
        digits.parse::<u32>().ok().filter(|q| *q > 0)
    }
}

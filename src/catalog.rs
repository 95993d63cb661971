//! Loaded product catalog.

use crate::models::{Category, CategoryId, Product, ProductId};

/// Label of the pseudo-category that lists every product.
pub const ALL_CATEGORIES_LABEL: &str = "All";

/// Display name for a sale line whose product is no longer in the catalog.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown product";

/// One entry of the category bar. `id == None` is the "all" tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTab {
    pub id: Option<CategoryId>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    products: Vec<Product>,
    categories: Vec<Category>,
}

impl Catalog {
    pub fn new(products: Vec<Product>, categories: Vec<Category>) -> Self {
        Self {
            products,
            categories,
        }
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Products of one category, or all of them for `None`.
    pub fn products_in(&self, category: Option<CategoryId>) -> Vec<&Product> {
        match category {
            None => self.products.iter().collect(),
            Some(cid) => self
                .products
                .iter()
                .filter(|p| p.category_id == Some(cid))
                .collect(),
        }
    }

    /// Category bar entries, "all" first.
    pub fn tabs(&self) -> Vec<CategoryTab> {
        std::iter::once(CategoryTab {
            id: None,
            name: ALL_CATEGORIES_LABEL.to_string(),
        })
        .chain(self.categories.iter().map(|c| CategoryTab {
            id: Some(c.id),
            name: c.name.clone(),
        }))
        .collect()
    }
}

// 🏷️ Product Identity Resolver - one product per (name, HSN code)
//
// The same product shows up in every section of the sheet. The first record
// that names a (name, code) pair gives it an id; later records only refresh
// the unit, so the most recent non-empty unit label is the one kept.

use crate::model::{Product, ProductKey, StockRecord};
use std::collections::HashMap;

/// Ordered, deduplicated products plus a key → position lookup.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
    index: HashMap<ProductKey, usize>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from records already in resolution order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a dyn StockRecord>) -> Self {
        let mut catalog = Self::new();
        for record in records {
            catalog.observe(record);
        }
        catalog
    }

    pub fn observe(&mut self, record: &dyn StockRecord) {
        let key = record.product();
        let unit = record.unit();

        match self.index.get(key) {
            Some(&pos) => {
                if !unit.is_empty() {
                    self.products[pos].unit = unit.to_string();
                }
            }
            None => {
                self.index.insert(key.clone(), self.products.len());
                self.products.push(Product {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: key.name.clone(),
                    hsn_code: key.hsn_code.clone(),
                    unit: unit.to_string(),
                });
            }
        }
    }

    pub fn get(&self, key: &ProductKey) -> Option<&Product> {
        self.index.get(key).map(|&pos| &self.products[pos])
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn into_products(self) -> Vec<Product> {
        self.products
    }
}

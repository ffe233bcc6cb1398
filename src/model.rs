// 📦 Ledger records - typed output of the extraction pipeline
//
// Every section of the stock sheet produces its own record variant. All of
// them carry the product identity (name + HSN code), a unit label and a
// quantity; the monetary fields differ per section.

use crate::normalize::round_amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SECTION KINDS
// ============================================================================

/// The four stacked sections of the STOCK DETAILS sheet, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionKind {
    Incoming,
    Sale,
    Consumption,
    Balance,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Incoming,
        SectionKind::Sale,
        SectionKind::Consumption,
        SectionKind::Balance,
    ];

    /// Literal marker text that opens the section.
    pub fn sentinel(&self) -> &'static str {
        match self {
            SectionKind::Incoming => "PURCHASE - STOCK IN",
            SectionKind::Sale => "SALES TO CUSTOMER - STOCK OUT",
            SectionKind::Consumption => "SALON CONSUMPTION - STOCK OUT",
            SectionKind::Balance => "BALANCE STOCK",
        }
    }

    /// Prefix used to qualify resolved column names ("Purchase_Qty").
    pub fn field_prefix(&self) -> &'static str {
        match self {
            SectionKind::Incoming => "Purchase",
            SectionKind::Sale => "Sales",
            SectionKind::Consumption => "Consumption",
            SectionKind::Balance => "Balance",
        }
    }

    pub fn is_mandatory(&self) -> bool {
        !matches!(self, SectionKind::Balance)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sentinel())
    }
}

// ============================================================================
// SHARED VALUE TYPES
// ============================================================================

/// Product identity: name plus tax-classification (HSN) code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    #[serde(rename = "product_name")]
    pub name: String,
    pub hsn_code: String,
}

impl ProductKey {
    pub fn new(name: impl Into<String>, hsn_code: impl Into<String>) -> Self {
        ProductKey {
            name: name.into(),
            hsn_code: hsn_code.into(),
        }
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.hsn_code)
    }
}

/// Taxable value, the three GST components and the resulting total.
///
/// `total` is the invoice value on purchases/sales and the total purchase
/// cost on consumption and on the cost side of a sale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxAmounts {
    pub taxable_value: f64,
    pub igst: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub total: f64,
}

impl TaxAmounts {
    /// Intrastate supply: the whole tax is split into equal CGST/SGST halves.
    pub fn intrastate(taxable_value: f64, rate: f64) -> Self {
        let tax = taxable_value * rate;
        TaxAmounts {
            taxable_value,
            igst: 0.0,
            cgst: tax / 2.0,
            sgst: tax / 2.0,
            total: taxable_value + tax,
        }
    }

    /// Interstate supply: the whole tax is booked to IGST.
    pub fn interstate(taxable_value: f64, rate: f64) -> Self {
        let tax = taxable_value * rate;
        TaxAmounts {
            taxable_value,
            igst: tax,
            cgst: 0.0,
            sgst: 0.0,
            total: taxable_value + tax,
        }
    }

    pub fn tax(&self) -> f64 {
        self.igst + self.cgst + self.sgst
    }

    pub fn rounded(self) -> Self {
        TaxAmounts {
            taxable_value: round_amount(self.taxable_value),
            igst: round_amount(self.igst),
            cgst: round_amount(self.cgst),
            sgst: round_amount(self.sgst),
            total: round_amount(self.total),
        }
    }

    pub fn negated(self) -> Self {
        TaxAmounts {
            taxable_value: -self.taxable_value,
            igst: -self.igst,
            cgst: -self.cgst,
            sgst: -self.sgst,
            total: -self.total,
        }
    }

    pub fn minus(self, other: TaxAmounts) -> Self {
        TaxAmounts {
            taxable_value: self.taxable_value - other.taxable_value,
            igst: self.igst - other.igst,
            cgst: self.cgst - other.cgst,
            sgst: self.sgst - other.sgst,
            total: self.total - other.total,
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Row of the PURCHASE - STOCK IN section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub product: ProductKey,
    pub unit: String,
    pub invoice_no: String,
    pub qty: f64,
    pub price_incl_gst: f64,
    pub price_ex_gst: f64,
    pub discount_percentage: f64,
    pub cost_per_unit_ex_gst: f64,
    pub gst_percentage: f64,
    pub amounts: TaxAmounts,
    pub supplier: String,
}

/// Row of the SALES TO CUSTOMER - STOCK OUT section.
///
/// Carries both the sale-side breakdown (`amounts`) and the purchase cost of
/// the goods that left stock (`purchase_cost`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub product: ProductKey,
    pub unit: String,
    pub invoice_no: String,
    pub qty: f64,
    pub purchase_cost_per_unit_ex_gst: f64,
    pub purchase_gst_percentage: f64,
    pub purchase_cost: TaxAmounts,
    pub mrp_incl_gst: f64,
    pub mrp_ex_gst: f64,
    pub discount_percentage: f64,
    pub discounted_rate_ex_gst: f64,
    pub sales_gst_percentage: f64,
    pub amounts: TaxAmounts,
    pub customer: String,
    pub payment_method: String,
    /// Set once the sale has been reclassified as internal consumption.
    pub converted: bool,
}

/// Row of the SALON CONSUMPTION - STOCK OUT section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    pub id: String,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub product: ProductKey,
    pub unit: String,
    pub voucher_no: String,
    pub qty: f64,
    pub cost_per_unit_ex_gst: f64,
    pub gst_percentage: f64,
    pub amounts: TaxAmounts,
    pub purpose: String,
    /// Sale this record was reclassified from, if any.
    pub original_sale_id: Option<String>,
}

/// Row of the BALANCE STOCK section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLine {
    #[serde(flatten)]
    pub product: ProductKey,
    pub unit: String,
    pub qty: f64,
    pub amounts: TaxAmounts,
}

/// Anything that names a product, a unit and a quantity.
pub trait StockRecord {
    fn product(&self) -> &ProductKey;
    fn unit(&self) -> &str;
    fn qty(&self) -> f64;
}

macro_rules! impl_stock_record {
    ($($ty:ty),*) => {
        $(impl StockRecord for $ty {
            fn product(&self) -> &ProductKey {
                &self.product
            }
            fn unit(&self) -> &str {
                &self.unit
            }
            fn qty(&self) -> f64 {
                self.qty
            }
        })*
    };
}

impl_stock_record!(Purchase, Sale, Consumption, BalanceLine);

/// One extracted row, whichever section it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transaction_type", rename_all = "snake_case")]
pub enum TransactionRecord {
    Purchase(Purchase),
    Sale(Sale),
    Consumption(Consumption),
    Balance(BalanceLine),
}

impl TransactionRecord {
    pub fn kind(&self) -> SectionKind {
        match self {
            TransactionRecord::Purchase(_) => SectionKind::Incoming,
            TransactionRecord::Sale(_) => SectionKind::Sale,
            TransactionRecord::Consumption(_) => SectionKind::Consumption,
            TransactionRecord::Balance(_) => SectionKind::Balance,
        }
    }

    fn inner(&self) -> &dyn StockRecord {
        match self {
            TransactionRecord::Purchase(r) => r as &dyn StockRecord,
            TransactionRecord::Sale(r) => r as &dyn StockRecord,
            TransactionRecord::Consumption(r) => r as &dyn StockRecord,
            TransactionRecord::Balance(r) => r as &dyn StockRecord,
        }
    }
}

impl StockRecord for TransactionRecord {
    fn product(&self) -> &ProductKey {
        self.inner().product()
    }
    fn unit(&self) -> &str {
        self.inner().unit()
    }
    fn qty(&self) -> f64 {
        self.inner().qty()
    }
}

// ============================================================================
// PRODUCTS & SNAPSHOTS
// ============================================================================

/// Canonical product produced by the identity pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub hsn_code: String,
    pub unit: String,
}

impl Product {
    pub fn key(&self) -> ProductKey {
        ProductKey::new(self.name.clone(), self.hsn_code.clone())
    }
}

/// Structured contents of one stock sheet.
///
/// `balance` is `None` when the sheet had no BALANCE STOCK section at all,
/// and `Some(vec![])` when the section was present but empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub purchases: Vec<Purchase>,
    pub sales: Vec<Sale>,
    pub consumption: Vec<Consumption>,
    pub balance: Option<Vec<BalanceLine>>,
    pub products: Vec<Product>,
}

impl StockSnapshot {
    /// File one extracted record under its section. A balance record
    /// opens the balance list if the snapshot has none yet.
    pub fn push(&mut self, record: TransactionRecord) {
        match record {
            TransactionRecord::Purchase(r) => self.purchases.push(r),
            TransactionRecord::Sale(r) => self.sales.push(r),
            TransactionRecord::Consumption(r) => self.consumption.push(r),
            TransactionRecord::Balance(r) => self.balance.get_or_insert_with(Vec::new).push(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrastate_split_halves() {
        let amounts = TaxAmounts::intrastate(100.0, 0.18);
        assert_eq!(amounts.igst, 0.0);
        assert!((amounts.cgst - 9.0).abs() < 1e-9);
        assert!((amounts.sgst - 9.0).abs() < 1e-9);
        assert!((amounts.total - 118.0).abs() < 1e-9);
    }

    #[test]
    fn test_interstate_books_igst() {
        let amounts = TaxAmounts::interstate(200.0, 0.05);
        assert!((amounts.igst - 10.0).abs() < 1e-9);
        assert_eq!(amounts.cgst, 0.0);
        assert!((amounts.tax() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_minus_and_negated() {
        let base = TaxAmounts::intrastate(100.0, 0.18);
        let zero = base.minus(base);
        assert_eq!(zero, TaxAmounts::default());
        assert_eq!(base.negated().taxable_value, -100.0);
    }

    #[test]
    fn test_section_order_and_sentinels() {
        assert!(SectionKind::Incoming < SectionKind::Sale);
        assert!(SectionKind::Consumption < SectionKind::Balance);
        assert!(!SectionKind::Balance.is_mandatory());
        assert_eq!(SectionKind::Sale.to_string(), "SALES TO CUSTOMER - STOCK OUT");
    }

    #[test]
    fn test_transaction_record_dispatch() {
        let record = TransactionRecord::Balance(BalanceLine {
            product: ProductKey::new("Serum", "330499"),
            unit: "BTL".to_string(),
            qty: 4.0,
            amounts: TaxAmounts::default(),
        });
        assert_eq!(record.kind(), SectionKind::Balance);
        assert_eq!(record.product().name, "Serum");
        assert_eq!(record.unit(), "BTL");
        assert_eq!(record.qty(), 4.0);
    }

    #[test]
    fn test_snapshot_push_files_by_section() {
        let mut snapshot = StockSnapshot::default();
        snapshot.push(TransactionRecord::Balance(BalanceLine {
            product: ProductKey::new("Serum", "330499"),
            unit: "BTL".to_string(),
            qty: 4.0,
            amounts: TaxAmounts::default(),
        }));

        assert!(snapshot.purchases.is_empty());
        assert_eq!(snapshot.balance.as_ref().map(Vec::len), Some(1));
    }
}

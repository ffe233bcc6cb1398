// 🧩 Column Resolver - map a section's columns to semantic fields
//
// Header text in these sheets is unreliable: the same label ("Qty.",
// "IGST", "Invoice No.") appears in several sections with different meanings,
// and some header cells are blank placeholders. Each section kind therefore
// owns an ordered field list. The positional strategy reads it by column
// index; the header-text strategy walks it in order and lets the first
// not-yet-claimed field whose pattern matches win.

use crate::error::Result;
use crate::grid::Cell;
use crate::model::SectionKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// FIELD TABLES
// ============================================================================

/// One semantic column of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Unqualified key, e.g. "Qty".
    pub key: &'static str,
    /// Canonical header label written on export.
    pub label: &'static str,
    /// Case-insensitive pattern matched against whitespace-collapsed header text.
    pub pattern: &'static str,
}

const fn field(key: &'static str, label: &'static str, pattern: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        label,
        pattern,
    }
}

pub const PURCHASE_FIELDS: &[FieldSpec] = &[
    field("Date", "Date", r"^(date|purchase date|date of purchase|unnamed: \d+)?$"),
    field("ProductName", "Product Name", r"^(product name|product|name|item)$"),
    field("HsnCode", "HSN Code", r"^(hsn code|hsn|hsn/sac|hsn/sac code)$"),
    field("Units", "UNITS", r"^(units?|uom)$"),
    field("InvoiceNo", "Invoice No.", r"^(purchase )?invoice (no\.?|number)$"),
    field("Qty", "Qty.", r"^(purchase )?(qty\.?|quantity)$"),
    field("PriceInclGst", "Price Incl. GST", r"^((price|rate) )?incl(\.|uding)? gst$"),
    field("PriceExGst", "Price Ex. GST", r"^((price|rate) )?(ex|excl)(\.|uding)? gst$"),
    field("DiscountPct", "Discount %", r"^discount( on purchase)? ?(%|percentage)$"),
    field(
        "CostPerUnitExGst",
        "Purchase Cost Per Unit Ex. GST",
        r"^(purchase )?cost per unit( ex\.? gst)?$",
    ),
    field("GstPct", "GST %", r"^gst ?(%|percentage|rate)$"),
    field("TaxableValue", "Taxable Value", r"^(purchase )?taxable (value|amount)$"),
    field("Igst", "IGST", r"^(purchases? )?igst( amount)?$"),
    field("Cgst", "CGST", r"^(purchases? )?cgst( amount)?$"),
    field("Sgst", "SGST", r"^(purchases? )?sgst( amount)?$"),
    field("InvoiceValue", "Invoice Value", r"^(purchase )?invoice (value|amount)$|^total amount$"),
    field("Supplier", "Supplier", r"^(supplier|supplier name|vendor)$"),
];

pub const SALES_FIELDS: &[FieldSpec] = &[
    field("Date", "Date", r"^(date|sales? date|date of sale|unnamed: \d+)?$"),
    field("ProductName", "Product Name", r"^(product name|product|name|item)$"),
    field("HsnCode", "HSN Code", r"^(hsn code|hsn|hsn/sac|hsn/sac code)$"),
    field("Units", "UNITS", r"^(units?|uom)$"),
    field("InvoiceNo", "Invoice No.", r"^(sales )?invoice (no\.?|number)$"),
    field("Qty", "Qty.", r"^(sales )?(qty\.?|quantity)$"),
    field(
        "PurchaseCostPerUnitExGst",
        "Purchase Cost Per Unit Ex. GST",
        r"^(purchase )?cost per unit( ex\.? gst)?$",
    ),
    field("PurchaseGstPct", "Purchase GST %", r"^purchase gst ?(%|percentage|rate)$"),
    field("PurchaseTaxableValue", "Purchase Taxable Value", r"^purchase taxable (value|amount)$"),
    field("PurchaseIgst", "Purchase IGST", r"^(purchases? )?igst$"),
    field("PurchaseCgst", "Purchase CGST", r"^(purchases? )?cgst$"),
    field("PurchaseSgst", "Purchase SGST", r"^(purchases? )?sgst$"),
    field("TotalPurchaseCost", "Total Purchase Cost", r"^total purchase cost$"),
    field("MrpInclGst", "MRP Incl. GST", r"^mrp incl(\.|uding)? gst$|^mrp$"),
    field("MrpExGst", "MRP Ex. GST", r"^mrp (ex|excl)(\.|uding)? gst$"),
    field("DiscountPct", "Discount %", r"^(sales )?discount ?(%|percentage)$"),
    field(
        "DiscountedRateExGst",
        "Discounted Sales Rate Ex. GST",
        r"^discounted sales rate( ex\.? gst)?$",
    ),
    field("SalesGstPct", "Sales GST %", r"^(sales )?gst ?(%|percentage|rate)$"),
    field("SalesTaxableValue", "Sales Taxable Value", r"^(sales )?taxable (value|amount)$"),
    field("SalesIgst", "Sales IGST", r"^(sales )?igst$"),
    field("SalesCgst", "Sales CGST", r"^(sales )?cgst$"),
    field("SalesSgst", "Sales SGST", r"^(sales )?sgst$"),
    field("InvoiceValue", "Invoice Value", r"^(sales )?invoice (value|amount)$|^total amount$"),
    field("Customer", "Customer", r"^(customer|customer name|client)$"),
    field("PaymentMethod", "Payment Method", r"^(payment method|payment mode|mode of payment)$"),
];

pub const CONSUMPTION_FIELDS: &[FieldSpec] = &[
    field("Date", "Date", r"^(date|consumption date|date of consumption|unnamed: \d+)?$"),
    field("ProductName", "Product Name", r"^(product name|product|name|item)$"),
    field("HsnCode", "HSN Code", r"^(hsn code|hsn|hsn/sac|hsn/sac code)$"),
    field("Units", "UNITS", r"^(units?|uom)$"),
    field(
        "VoucherNo",
        "Requisition Voucher No.",
        r"^(requisition )?voucher (no\.?|number)$|^reference no\.?$",
    ),
    field("Qty", "Qty.", r"^(consumption )?(qty\.?|quantity)$"),
    field(
        "CostPerUnitExGst",
        "Purchase Cost Per Unit Ex. GST",
        r"^(purchase )?cost per unit( ex\.? gst)?$",
    ),
    field("GstPct", "Purchase GST %", r"^(purchase )?gst ?(%|percentage|rate)$"),
    field("TaxableValue", "Taxable Value", r"^(purchase )?taxable (value|amount)$"),
    field("Igst", "IGST", r"^(purchases? )?igst$"),
    field("Cgst", "CGST", r"^(purchases? )?cgst$"),
    field("Sgst", "SGST", r"^(purchases? )?sgst$"),
    field("TotalPurchaseCost", "Total Purchase Cost", r"^total purchase cost$|^(consumption )?cost$"),
    field("Purpose", "Purpose", r"^(purpose|remarks?|notes?)$"),
];

pub const BALANCE_FIELDS: &[FieldSpec] = &[
    field("ProductName", "Product Name", r"^(product name|product|name|item)$"),
    field("HsnCode", "HSN Code", r"^(hsn code|hsn|hsn/sac|hsn/sac code)$"),
    field("Units", "UNITS", r"^(units?|uom)$"),
    field("Qty", "Qty.", r"^((balance|closing) )?(qty\.?|quantity|stock)$|^unnamed: \d+$"),
    field("TaxableValue", "Taxable Value", r"^taxable (value|amount)$"),
    field("Igst", "IGST", r"^igst$"),
    field("Cgst", "CGST", r"^cgst$"),
    field("Sgst", "SGST", r"^sgst$"),
    field("InvoiceValue", "Invoice Value", r"^(invoice|total) (value|amount)$"),
];

/// Ordered field list of a section kind.
pub fn fields_for(kind: SectionKind) -> &'static [FieldSpec] {
    match kind {
        SectionKind::Incoming => PURCHASE_FIELDS,
        SectionKind::Sale => SALES_FIELDS,
        SectionKind::Consumption => CONSUMPTION_FIELDS,
        SectionKind::Balance => BALANCE_FIELDS,
    }
}

/// Section-qualified column name, e.g. `Sales_Qty`.
pub fn qualified_name(kind: SectionKind, key: &str) -> String {
    format!("{}_{}", kind.field_prefix(), key)
}

// ============================================================================
// FIELD MAP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStrategy {
    /// Column index decides the field; header text is ignored.
    #[default]
    Positional,
    /// Header text is matched against the section's pattern table.
    HeaderText,
}

/// Column index → resolved name for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    kind: SectionKind,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FieldMap {
    fn from_names(kind: SectionKind, names: Vec<String>) -> Self {
        let mut index = HashMap::new();
        for (col, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(col);
        }
        FieldMap { kind, names, index }
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Resolved names in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Column holding the field with unqualified `key`, if the layout has one.
    pub fn column_of(&self, key: &str) -> Option<usize> {
        self.index.get(&qualified_name(self.kind, key)).copied()
    }
}

fn auto_name(col: usize) -> String {
    format!("Column_{}", col)
}

/// Fixed index → field lookup. Columns past the table get generated names.
pub fn resolve_positional(kind: SectionKind, width: usize) -> FieldMap {
    let fields = fields_for(kind);
    let names = (0..width.max(fields.len()))
        .map(|col| match fields.get(col) {
            Some(spec) => qualified_name(kind, spec.key),
            None => auto_name(col),
        })
        .collect();
    FieldMap::from_names(kind, names)
}

fn normalize_header(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Match header text against the section's ordered pattern table.
///
/// Each field can be claimed once. Unmatched non-blank headers keep their
/// text; unmatched blank ones (and columns past the header) get generated
/// names.
pub fn resolve_header_text(kind: SectionKind, header: &[Cell], width: usize) -> Result<FieldMap> {
    let fields = fields_for(kind);
    let patterns = fields
        .iter()
        .map(|spec| Regex::new(&format!("(?i){}", spec.pattern)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut claimed = vec![false; fields.len()];

    let mut names = Vec::with_capacity(width.max(header.len()));
    for col in 0..width.max(header.len()) {
        let raw = header.get(col).map(Cell::as_text).unwrap_or_default();
        let text = normalize_header(&raw);

        let matched = (0..fields.len()).find(|&i| !claimed[i] && patterns[i].is_match(&text));
        let name = match matched {
            Some(i) => {
                claimed[i] = true;
                qualified_name(kind, fields[i].key)
            }
            None if raw.is_empty() => auto_name(col),
            None => raw,
        };
        names.push(name);
    }

    Ok(FieldMap::from_names(kind, names))
}

/// Resolve a section's columns with the chosen strategy.
///
/// Header-text resolution needs a header row; without one the positional
/// table is used.
pub fn resolve_columns(
    kind: SectionKind,
    header: Option<&[Cell]>,
    width: usize,
    strategy: ColumnStrategy,
) -> Result<FieldMap> {
    let map = match (strategy, header) {
        (ColumnStrategy::HeaderText, Some(header)) => resolve_header_text(kind, header, width)?,
        (ColumnStrategy::HeaderText, None) => {
            log::debug!("{:?} has no header row; using positional columns", kind);
            resolve_positional(kind, width)
        }
        (ColumnStrategy::Positional, _) => resolve_positional(kind, width),
    };
    log::debug!("{:?} columns: {:?}", kind, map.names());
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(labels: &[&str]) -> Vec<Cell> {
        labels.iter().map(|s| Cell::text(*s)).collect()
    }

    #[test]
    fn test_positional_ignores_header_text() {
        let map = resolve_positional(SectionKind::Sale, 3);
        assert_eq!(map.column_of("Qty"), Some(5));
        assert_eq!(map.column_of("PaymentMethod"), Some(24));
        assert_eq!(map.names()[0], "Sales_Date");
    }

    #[test]
    fn test_same_index_means_different_fields_per_section() {
        let purchase = resolve_positional(SectionKind::Incoming, 0);
        let sale = resolve_positional(SectionKind::Sale, 0);
        let balance = resolve_positional(SectionKind::Balance, 0);
        assert_eq!(purchase.names()[6], "Purchase_PriceInclGst");
        assert_eq!(sale.names()[6], "Sales_PurchaseCostPerUnitExGst");
        assert_eq!(balance.names()[0], "Balance_ProductName");
        assert_eq!(balance.column_of("Qty"), Some(3));
    }

    #[test]
    fn test_positional_extra_columns_get_generated_names() {
        let map = resolve_positional(SectionKind::Balance, 11);
        assert_eq!(map.names().len(), 11);
        assert_eq!(map.names()[9], "Column_9");
        assert_eq!(map.names()[10], "Column_10");
    }

    #[test]
    fn test_header_text_canonical_labels_resolve_in_place() {
        for kind in SectionKind::ALL {
            let labels: Vec<&str> = fields_for(kind).iter().map(|f| f.label).collect();
            let map = resolve_header_text(kind, &header(&labels), 0).unwrap();
            assert_eq!(map, resolve_positional(kind, 0), "labels of {:?}", kind);
        }
    }

    #[test]
    fn test_header_text_duplicate_labels_take_fields_in_order() {
        let map = resolve_header_text(
            SectionKind::Sale,
            &header(&["", "Product Name", "IGST", "IGST", "Qty."]),
            0,
        )
        .unwrap();
        assert_eq!(
            map.names(),
            &[
                "Sales_Date".to_string(),
                "Sales_ProductName".to_string(),
                "Sales_PurchaseIgst".to_string(),
                "Sales_SalesIgst".to_string(),
                "Sales_Qty".to_string(),
            ]
        );
    }

    #[test]
    fn test_header_text_unmatched_passthrough() {
        let map = resolve_header_text(
            SectionKind::Incoming,
            &header(&["Date", "Product  Name", "Shelf", "", "qty."]),
            7,
        )
        .unwrap();
        assert_eq!(map.names()[1], "Purchase_ProductName");
        assert_eq!(map.names()[2], "Shelf");
        assert_eq!(map.names()[3], "Column_3");
        assert_eq!(map.names()[4], "Purchase_Qty");
        assert_eq!(map.names()[6], "Column_6");
        assert_eq!(map.column_of("Qty"), Some(4));
        assert_eq!(map.column_of("Supplier"), None);
    }

    #[test]
    fn test_header_text_short_row_leaves_fields_missing() {
        let map = resolve_header_text(SectionKind::Consumption, &header(&["Date"]), 0).unwrap();
        assert_eq!(map.names().len(), 1);
        assert_eq!(map.column_of("ProductName"), None);
    }

    #[test]
    fn test_resolve_columns_without_header_falls_back() {
        let map = resolve_columns(SectionKind::Incoming, None, 0, ColumnStrategy::HeaderText).unwrap();
        assert_eq!(map, resolve_positional(SectionKind::Incoming, 0));
    }
}

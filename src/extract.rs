// 📥 Record Extractor - section rows → typed ledger records
//
// Drives the pipeline for one grid: locate sections, resolve each section's
// columns, turn every data row that names a product into a record, then run
// the identity pass over the result.

use crate::columns::{resolve_columns, FieldMap};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::grid::{Cell, RawGrid};
use crate::model::{
    BalanceLine, Consumption, ProductKey, Purchase, Sale, SectionKind, StockRecord, StockSnapshot,
    TaxAmounts, TransactionRecord,
};
use crate::normalize::{cell_date, normalize_numeric, parse_amount, round_amount, standardize_unit};
use crate::products::ProductCatalog;
use crate::sections::{locate_sections, SectionBounds};
use chrono::NaiveDate;

// ============================================================================
// ROW ACCESS
// ============================================================================

/// One data row read through its section's field map.
struct RowView<'a> {
    cells: &'a [Cell],
    fields: &'a FieldMap,
}

static MISSING: Cell = Cell::Empty;

impl<'a> RowView<'a> {
    fn cell(&self, key: &str) -> &'a Cell {
        self.fields
            .column_of(key)
            .and_then(|col| self.cells.get(col))
            .unwrap_or(&MISSING)
    }

    fn text(&self, key: &str) -> String {
        self.cell(key).as_text()
    }

    /// Missing or unparsable numbers read as 0.
    fn number(&self, key: &str) -> f64 {
        match normalize_numeric(self.cell(key).clone()) {
            Cell::Number(n) => n,
            Cell::Text(text) => parse_amount(&text).map(round_amount).unwrap_or(0.0),
            Cell::Empty => 0.0,
        }
    }

    fn date(&self, key: &str) -> Option<NaiveDate> {
        cell_date(self.cell(key))
    }

    fn product(&self) -> ProductKey {
        ProductKey::new(self.text("ProductName"), self.text("HsnCode"))
    }

    fn unit(&self) -> String {
        standardize_unit(&self.text("Units"))
    }

    fn amounts(&self, taxable: &str, igst: &str, cgst: &str, sgst: &str, total: &str) -> TaxAmounts {
        TaxAmounts {
            taxable_value: self.number(taxable),
            igst: self.number(igst),
            cgst: self.number(cgst),
            sgst: self.number(sgst),
            total: self.number(total),
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// RECORD BUILDERS
// ============================================================================

fn purchase_from(row: &RowView) -> Purchase {
    Purchase {
        id: new_id(),
        date: row.date("Date"),
        product: row.product(),
        unit: row.unit(),
        invoice_no: row.text("InvoiceNo"),
        qty: row.number("Qty"),
        price_incl_gst: row.number("PriceInclGst"),
        price_ex_gst: row.number("PriceExGst"),
        discount_percentage: row.number("DiscountPct"),
        cost_per_unit_ex_gst: row.number("CostPerUnitExGst"),
        gst_percentage: row.number("GstPct"),
        amounts: row.amounts("TaxableValue", "Igst", "Cgst", "Sgst", "InvoiceValue"),
        supplier: row.text("Supplier"),
    }
}

fn sale_from(row: &RowView, default_payment_method: &str) -> Sale {
    let payment_method = match row.text("PaymentMethod") {
        method if method.is_empty() => default_payment_method.to_string(),
        method => method,
    };

    Sale {
        id: new_id(),
        date: row.date("Date"),
        product: row.product(),
        unit: row.unit(),
        invoice_no: row.text("InvoiceNo"),
        qty: row.number("Qty"),
        purchase_cost_per_unit_ex_gst: row.number("PurchaseCostPerUnitExGst"),
        purchase_gst_percentage: row.number("PurchaseGstPct"),
        purchase_cost: row.amounts(
            "PurchaseTaxableValue",
            "PurchaseIgst",
            "PurchaseCgst",
            "PurchaseSgst",
            "TotalPurchaseCost",
        ),
        mrp_incl_gst: row.number("MrpInclGst"),
        mrp_ex_gst: row.number("MrpExGst"),
        discount_percentage: row.number("DiscountPct"),
        discounted_rate_ex_gst: row.number("DiscountedRateExGst"),
        sales_gst_percentage: row.number("SalesGstPct"),
        amounts: row.amounts(
            "SalesTaxableValue",
            "SalesIgst",
            "SalesCgst",
            "SalesSgst",
            "InvoiceValue",
        ),
        customer: row.text("Customer"),
        payment_method,
        converted: false,
    }
}

fn consumption_from(row: &RowView) -> Consumption {
    Consumption {
        id: new_id(),
        date: row.date("Date"),
        product: row.product(),
        unit: row.unit(),
        voucher_no: row.text("VoucherNo"),
        qty: row.number("Qty"),
        cost_per_unit_ex_gst: row.number("CostPerUnitExGst"),
        gst_percentage: row.number("GstPct"),
        amounts: row.amounts("TaxableValue", "Igst", "Cgst", "Sgst", "TotalPurchaseCost"),
        purpose: row.text("Purpose"),
        original_sale_id: None,
    }
}

fn balance_from(row: &RowView) -> BalanceLine {
    BalanceLine {
        product: row.product(),
        unit: row.unit(),
        qty: row.number("Qty"),
        amounts: row.amounts("TaxableValue", "Igst", "Cgst", "Sgst", "InvoiceValue"),
    }
}

// ============================================================================
// SECTION EXTRACTION
// ============================================================================

fn record_from(kind: SectionKind, row: &RowView, config: &LedgerConfig) -> TransactionRecord {
    match kind {
        SectionKind::Incoming => TransactionRecord::Purchase(purchase_from(row)),
        SectionKind::Sale => {
            TransactionRecord::Sale(sale_from(row, &config.default_payment_method))
        }
        SectionKind::Consumption => TransactionRecord::Consumption(consumption_from(row)),
        SectionKind::Balance => TransactionRecord::Balance(balance_from(row)),
    }
}

/// Build one record per data row that names a product, in sheet order.
fn extract_section(
    grid: &RawGrid,
    bounds: &SectionBounds,
    config: &LedgerConfig,
) -> Result<Vec<TransactionRecord>> {
    let header = bounds.header_row_index.map(|idx| grid.row(idx));
    let width = header
        .iter()
        .map(|h| h.len())
        .chain(bounds.data_rows().map(|idx| grid.row(idx).len()))
        .max()
        .unwrap_or(0);
    let fields = resolve_columns(bounds.kind, header, width, config.layout.columns)?;

    let mut records = Vec::new();
    for row_idx in bounds.data_rows() {
        let cells = grid.row(row_idx);
        let view = RowView {
            cells,
            fields: &fields,
        };
        if view.text("ProductName").is_empty() {
            if cells.iter().any(|c| !c.is_empty()) {
                log::warn!(
                    "{:?} row {} has data but no product name; skipped",
                    bounds.kind,
                    row_idx + 1
                );
            }
            continue;
        }
        records.push(record_from(bounds.kind, &view, config));
    }

    log::debug!("{:?}: {} record(s)", bounds.kind, records.len());
    Ok(records)
}

/// Parse a loaded grid into a structured snapshot with resolved products.
pub fn parse_grid(grid: &RawGrid, config: &LedgerConfig) -> Result<StockSnapshot> {
    if grid.rows().all(|row| row.iter().all(Cell::is_empty)) {
        return Err(LedgerError::EmptyGrid);
    }

    let layout = &config.layout;
    let sections = locate_sections(grid, layout.scan, layout.local_header_row)?;
    let mut snapshot = StockSnapshot::default();

    // sections come back in sheet order, which is also identity order
    let mut records = Vec::new();
    for bounds in sections.iter() {
        if bounds.kind == SectionKind::Balance {
            snapshot.balance = Some(Vec::new());
        }
        records.extend(extract_section(grid, bounds, config)?);
    }

    let catalog = ProductCatalog::from_records(records.iter().map(|r| r as &dyn StockRecord));
    for record in records {
        snapshot.push(record);
    }
    snapshot.products = catalog.into_products();

    log::info!(
        "parsed sheet: {} purchases, {} sales, {} consumption, {} balance, {} products",
        snapshot.purchases.len(),
        snapshot.sales.len(),
        snapshot.consumption.len(),
        snapshot.balance.as_ref().map_or(0, Vec::len),
        snapshot.products.len()
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnStrategy;
    use crate::config::LayoutOptions;
    use crate::sections::SentinelScan;
    use pretty_assertions::assert_eq;

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn create_test_grid() -> RawGrid {
        RawGrid::new(vec![
            vec![t("STOCK DETAILS")],
            vec![],
            vec![t("PURCHASE - STOCK IN")],
            vec![t("Date"), t("Product Name"), t("HSN Code"), t("UNITS"), t("Invoice No."), t("Qty.")],
            vec![
                t("2024-01-01"),
                t("Shampoo"),
                t("330410"),
                t("BTL-BOTTLES"),
                t("INV1"),
                n(10.0),
                n(118.0),
                n(100.0),
                n(0.0),
                n(100.0),
                n(0.18),
                n(1000.0),
                n(0.0),
                n(90.0),
                n(90.0),
                n(1180.0),
                t("Acme Traders"),
            ],
            vec![],
            vec![t("SALES TO CUSTOMER - STOCK OUT")],
            vec![t("Date"), t("Product Name")],
            vec![
                n(45297.0),
                t("Shampoo"),
                n(330410.0),
                t("PCS-PIECES"),
                t("S-1"),
                n(2.0),
            ],
            vec![
                t("07/01/2024"),
                t("Shampoo"),
                t("330410"),
                t("BTL-BOTTLES"),
                t("S-2"),
                n(1.0),
                n(100.0),
                n(0.18),
                n(100.0),
                n(0.0),
                n(9.0),
                n(9.0),
                n(118.0),
                n(200.0),
                n(169.49),
                n(0.0),
                n(169.49),
                n(0.18),
                n(169.49),
                n(0.0),
                n(15.254),
                n(15.254),
                n(200.0),
                t("Walk-in"),
                t("card"),
            ],
            vec![t("SALON CONSUMPTION - STOCK OUT")],
            vec![t("Date"), t("Product Name")],
            vec![t(""), t(""), t(""), t("stray note")],
            vec![t("2024-01-08"), t("Wax"), t("340520"), t("JAR-JARS"), t("RV-1"), t("1,000")],
            vec![t("BALANCE STOCK")],
            vec![t("Product Name"), t("HSN Code"), t("UNITS"), t("Qty.")],
            vec![t("Shampoo"), t("330410"), t("BTL"), n(7.0), n(700.0), n(1e-12)],
        ])
    }

    #[test]
    fn test_example_purchase_row() {
        let snapshot = parse_grid(&create_test_grid(), &LedgerConfig::default()).unwrap();

        assert_eq!(snapshot.purchases.len(), 1);
        let purchase = &snapshot.purchases[0];
        assert_eq!(purchase.product, ProductKey::new("Shampoo", "330410"));
        assert_eq!(purchase.unit, "BTL");
        assert_eq!(purchase.qty, 10.0);
        assert_eq!(purchase.date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(purchase.amounts.taxable_value, 1000.0);
        assert_eq!(purchase.amounts.total, 1180.0);
        assert_eq!(purchase.supplier, "Acme Traders");
        assert_eq!(purchase.id.len(), 36);
    }

    #[test]
    fn test_sales_defaults_and_breakdowns() {
        let snapshot = parse_grid(&create_test_grid(), &LedgerConfig::default()).unwrap();
        assert_eq!(snapshot.sales.len(), 2);

        let short = &snapshot.sales[0];
        assert_eq!(short.date, NaiveDate::from_ymd_opt(2024, 1, 6));
        assert_eq!(short.product.hsn_code, "330410");
        assert_eq!(short.unit, "PCS");
        assert_eq!(short.payment_method, "cash");
        assert_eq!(short.customer, "");
        assert_eq!(short.amounts, TaxAmounts::default());

        let full = &snapshot.sales[1];
        assert_eq!(full.date, NaiveDate::from_ymd_opt(2024, 1, 7));
        assert_eq!(full.purchase_cost.total, 118.0);
        assert_eq!(full.mrp_incl_gst, 200.0);
        assert_eq!(full.amounts.cgst, 15.25);
        assert_eq!(full.payment_method, "card");
        assert!(!full.converted);
    }

    #[test]
    fn test_configured_payment_default() {
        let config = LedgerConfig {
            default_payment_method: "upi".to_string(),
            ..LedgerConfig::default()
        };
        let snapshot = parse_grid(&create_test_grid(), &config).unwrap();
        assert_eq!(snapshot.sales[0].payment_method, "upi");
    }

    #[test]
    fn test_rows_without_product_dropped() {
        let snapshot = parse_grid(&create_test_grid(), &LedgerConfig::default()).unwrap();
        assert_eq!(snapshot.consumption.len(), 1);
        let wax = &snapshot.consumption[0];
        assert_eq!(wax.unit, "JAR");
        assert_eq!(wax.qty, 1000.0);
        assert_eq!(wax.voucher_no, "RV-1");
        assert_eq!(wax.purpose, "");
    }

    #[test]
    fn test_balance_and_products() {
        let snapshot = parse_grid(&create_test_grid(), &LedgerConfig::default()).unwrap();
        let balance = snapshot.balance.as_ref().unwrap();
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].qty, 7.0);
        assert_eq!(balance[0].amounts.taxable_value, 700.0);
        assert_eq!(balance[0].amounts.igst, 0.0);

        // Shampoo seen in purchases, sales and balance; Wax only in consumption
        assert_eq!(snapshot.products.len(), 2);
        assert_eq!(snapshot.products[0].name, "Shampoo");
        assert_eq!(snapshot.products[0].unit, "BTL");
        assert_eq!(snapshot.products[1].name, "Wax");
    }

    #[test]
    fn test_supplier_named_like_a_marker_stays_data() {
        let mut purchase = vec![t("2024-01-01"), t("Shampoo"), t("330410"), t("BTL"), t("INV1"), n(2.0)];
        purchase.resize(16, n(0.0));
        purchase.push(t("BALANCE STOCK DEPOT"));

        let grid = RawGrid::new(vec![
            vec![t("PURCHASE - STOCK IN")],
            vec![t("Date"), t("Product Name")],
            purchase,
            vec![t("SALES TO CUSTOMER - STOCK OUT")],
            vec![t("Date"), t("Product Name")],
            vec![t("SALON CONSUMPTION - STOCK OUT")],
            vec![t("Date"), t("Product Name")],
        ]);
        let snapshot = parse_grid(&grid, &LedgerConfig::default()).unwrap();

        assert_eq!(snapshot.purchases.len(), 1);
        assert_eq!(snapshot.purchases[0].supplier, "BALANCE STOCK DEPOT");
        assert_eq!(snapshot.balance, None);
    }

    #[test]
    fn test_two_sales_different_units_keep_last() {
        let grid = RawGrid::new(vec![
            vec![t("PURCHASE - STOCK IN")],
            vec![t("SALES TO CUSTOMER - STOCK OUT")],
            vec![t(""), t("Serum"), t("330499"), t("BOX-BOXES"), t(""), n(1.0)],
            vec![t(""), t("Serum"), t("330499"), t("PKT-PACKETS"), t(""), n(1.0)],
            vec![t("SALON CONSUMPTION - STOCK OUT")],
        ]);
        let config = LedgerConfig {
            layout: LayoutOptions {
                scan: SentinelScan::FirstColumn,
                local_header_row: false,
                columns: ColumnStrategy::Positional,
            },
            ..LedgerConfig::default()
        };
        let snapshot = parse_grid(&grid, &config).unwrap();

        assert_eq!(snapshot.sales.len(), 2);
        assert_eq!(snapshot.products.len(), 1);
        assert_eq!(snapshot.products[0].unit, "PKT");
        assert_eq!(snapshot.balance, None);
    }

    #[test]
    fn test_header_text_layout() {
        let grid = RawGrid::new(vec![
            vec![t("PURCHASE - STOCK IN")],
            vec![t("Product Name"), t("Qty."), t("Date"), t("UNITS")],
            vec![t("Gel"), n(3.0), t("2024-02-01"), t("TUBE")],
            vec![t("SALES TO CUSTOMER - STOCK OUT")],
            vec![],
            vec![t("SALON CONSUMPTION - STOCK OUT")],
            vec![],
        ]);
        let config = LedgerConfig {
            layout: LayoutOptions {
                columns: ColumnStrategy::HeaderText,
                ..LayoutOptions::default()
            },
            ..LedgerConfig::default()
        };
        let snapshot = parse_grid(&grid, &config).unwrap();

        let gel = &snapshot.purchases[0];
        assert_eq!(gel.product.name, "Gel");
        assert_eq!(gel.qty, 3.0);
        assert_eq!(gel.unit, "TUBE");
        assert_eq!(gel.date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(gel.product.hsn_code, "");
    }

    #[test]
    fn test_empty_grid() {
        let grid = RawGrid::new(vec![vec![], vec![Cell::Empty, t("  ")]]);
        let err = parse_grid(&grid, &LedgerConfig::default()).unwrap_err();
        assert!(matches!(err, LedgerError::EmptyGrid));
    }

    #[test]
    fn test_missing_section_propagates() {
        let grid = RawGrid::new(vec![vec![t("PURCHASE - STOCK IN")], vec![t("x")]]);
        let err = parse_grid(&grid, &LedgerConfig::default()).unwrap_err();
        assert!(matches!(err, LedgerError::MissingSection(SectionKind::Sale)));
    }
}

// 📤 Workbook Renderer - lay a snapshot back out as a stock sheet
//
// Output layout, which the extractor reads back with the default options:
//
//   STOCK DETAILS
//   <blank>
//   <section marker>        ┐
//   <header labels>         │ once per section, in sheet order;
//   <data rows...>          │ balance only when present
//   <blank>                 ┘

use crate::columns::fields_for;
use crate::error::Result;
use crate::grid::{write_workbook, Cell, RawGrid};
use crate::model::{BalanceLine, Consumption, Purchase, Sale, SectionKind, StockSnapshot, TaxAmounts};
use chrono::NaiveDate;

pub const SHEET_TITLE: &str = "STOCK DETAILS";

/// A rendered sheet and the rows to emphasise.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSheet {
    pub grid: RawGrid,
    pub bold_rows: Vec<usize>,
}

fn date_cell(date: Option<NaiveDate>) -> Cell {
    match date {
        Some(date) => Cell::text(date.format("%Y-%m-%d").to_string()),
        None => Cell::Empty,
    }
}

fn tax_cells(amounts: &TaxAmounts) -> [Cell; 4] {
    [
        Cell::Number(amounts.taxable_value),
        Cell::Number(amounts.igst),
        Cell::Number(amounts.cgst),
        Cell::Number(amounts.sgst),
    ]
}

fn purchase_row(p: &Purchase) -> Vec<Cell> {
    let mut row = vec![
        date_cell(p.date),
        Cell::text(p.product.name.as_str()),
        Cell::text(p.product.hsn_code.as_str()),
        Cell::text(p.unit.as_str()),
        Cell::text(p.invoice_no.as_str()),
        Cell::Number(p.qty),
        Cell::Number(p.price_incl_gst),
        Cell::Number(p.price_ex_gst),
        Cell::Number(p.discount_percentage),
        Cell::Number(p.cost_per_unit_ex_gst),
        Cell::Number(p.gst_percentage),
    ];
    row.extend(tax_cells(&p.amounts));
    row.push(Cell::Number(p.amounts.total));
    row.push(Cell::text(p.supplier.as_str()));
    row
}

fn sale_row(s: &Sale) -> Vec<Cell> {
    let mut row = vec![
        date_cell(s.date),
        Cell::text(s.product.name.as_str()),
        Cell::text(s.product.hsn_code.as_str()),
        Cell::text(s.unit.as_str()),
        Cell::text(s.invoice_no.as_str()),
        Cell::Number(s.qty),
        Cell::Number(s.purchase_cost_per_unit_ex_gst),
        Cell::Number(s.purchase_gst_percentage),
    ];
    row.extend(tax_cells(&s.purchase_cost));
    row.extend([
        Cell::Number(s.purchase_cost.total),
        Cell::Number(s.mrp_incl_gst),
        Cell::Number(s.mrp_ex_gst),
        Cell::Number(s.discount_percentage),
        Cell::Number(s.discounted_rate_ex_gst),
        Cell::Number(s.sales_gst_percentage),
    ]);
    row.extend(tax_cells(&s.amounts));
    row.extend([
        Cell::Number(s.amounts.total),
        Cell::text(s.customer.as_str()),
        Cell::text(s.payment_method.as_str()),
    ]);
    row
}

fn consumption_row(c: &Consumption) -> Vec<Cell> {
    let mut row = vec![
        date_cell(c.date),
        Cell::text(c.product.name.as_str()),
        Cell::text(c.product.hsn_code.as_str()),
        Cell::text(c.unit.as_str()),
        Cell::text(c.voucher_no.as_str()),
        Cell::Number(c.qty),
        Cell::Number(c.cost_per_unit_ex_gst),
        Cell::Number(c.gst_percentage),
    ];
    row.extend(tax_cells(&c.amounts));
    row.push(Cell::Number(c.amounts.total));
    row.push(Cell::text(c.purpose.as_str()));
    row
}

fn balance_row(b: &BalanceLine) -> Vec<Cell> {
    let mut row = vec![
        Cell::text(b.product.name.as_str()),
        Cell::text(b.product.hsn_code.as_str()),
        Cell::text(b.unit.as_str()),
        Cell::Number(b.qty),
    ];
    row.extend(tax_cells(&b.amounts));
    row.push(Cell::Number(b.amounts.total));
    row
}

struct SheetBuilder {
    rows: Vec<Vec<Cell>>,
    bold_rows: Vec<usize>,
}

impl SheetBuilder {
    fn push_bold(&mut self, row: Vec<Cell>) {
        self.bold_rows.push(self.rows.len());
        self.rows.push(row);
    }

    fn section(&mut self, kind: SectionKind, data: impl Iterator<Item = Vec<Cell>>) {
        self.push_bold(vec![Cell::text(kind.sentinel())]);
        self.push_bold(fields_for(kind).iter().map(|f| Cell::text(f.label)).collect());
        self.rows.extend(data);
        self.rows.push(Vec::new());
    }
}

/// Lay records out in the sectioned sheet format.
pub fn render_grid(snapshot: &StockSnapshot) -> RenderedSheet {
    let mut sheet = SheetBuilder {
        rows: Vec::new(),
        bold_rows: Vec::new(),
    };
    sheet.push_bold(vec![Cell::text(SHEET_TITLE)]);
    sheet.rows.push(Vec::new());

    sheet.section(SectionKind::Incoming, snapshot.purchases.iter().map(purchase_row));
    sheet.section(SectionKind::Sale, snapshot.sales.iter().map(sale_row));
    sheet.section(SectionKind::Consumption, snapshot.consumption.iter().map(consumption_row));
    if let Some(balance) = &snapshot.balance {
        sheet.section(SectionKind::Balance, balance.iter().map(balance_row));
    }

    RenderedSheet {
        grid: RawGrid::new(sheet.rows),
        bold_rows: sheet.bold_rows,
    }
}

/// Render a snapshot to XLSX bytes on a sheet called `sheet_name`.
pub fn render_workbook(snapshot: &StockSnapshot, sheet_name: &str) -> Result<Vec<u8>> {
    let sheet = render_grid(snapshot);
    write_workbook(&sheet.grid, sheet_name, &sheet.bold_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::extract::parse_grid;
    use crate::grid::{GridSource, WorkbookSource};
    use crate::model::ProductKey;
    use pretty_assertions::assert_eq;

    fn create_test_snapshot() -> StockSnapshot {
        StockSnapshot {
            purchases: vec![Purchase {
                id: "p1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1),
                product: ProductKey::new("Shampoo", "330410"),
                unit: "BTL".to_string(),
                invoice_no: "INV1".to_string(),
                qty: 10.0,
                price_incl_gst: 118.0,
                price_ex_gst: 100.0,
                discount_percentage: 0.0,
                cost_per_unit_ex_gst: 100.0,
                gst_percentage: 0.18,
                amounts: TaxAmounts::intrastate(1000.0, 0.18).rounded(),
                supplier: "Acme".to_string(),
            }],
            sales: vec![Sale {
                id: "s1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 5),
                product: ProductKey::new("Shampoo", "330410"),
                unit: "BTL".to_string(),
                invoice_no: "S-1".to_string(),
                qty: 2.0,
                purchase_cost_per_unit_ex_gst: 100.0,
                purchase_gst_percentage: 0.18,
                purchase_cost: TaxAmounts::intrastate(200.0, 0.18).rounded(),
                mrp_incl_gst: 150.0,
                mrp_ex_gst: 127.12,
                discount_percentage: 0.0,
                discounted_rate_ex_gst: 127.12,
                sales_gst_percentage: 0.18,
                amounts: TaxAmounts::intrastate(254.24, 0.18).rounded(),
                customer: "Walk-in".to_string(),
                payment_method: "cash".to_string(),
                converted: false,
            }],
            consumption: vec![Consumption {
                id: "c1".to_string(),
                date: None,
                product: ProductKey::new("Wax", "340520"),
                unit: "JAR".to_string(),
                voucher_no: "".to_string(),
                qty: 1.0,
                cost_per_unit_ex_gst: 50.0,
                gst_percentage: 0.18,
                amounts: TaxAmounts::intrastate(50.0, 0.18).rounded(),
                purpose: "Facial".to_string(),
                original_sale_id: None,
            }],
            balance: Some(vec![BalanceLine {
                product: ProductKey::new("Shampoo", "330410"),
                unit: "BTL".to_string(),
                qty: 8.0,
                amounts: TaxAmounts::intrastate(800.0, 0.18).rounded(),
            }]),
            products: Vec::new(),
        }
    }

    /// Ids are regenerated on every parse.
    fn without_ids(mut snapshot: StockSnapshot) -> StockSnapshot {
        snapshot.purchases.iter_mut().for_each(|r| r.id.clear());
        snapshot.sales.iter_mut().for_each(|r| r.id.clear());
        snapshot.consumption.iter_mut().for_each(|r| r.id.clear());
        snapshot.products.clear();
        snapshot
    }

    #[test]
    fn test_layout() {
        let sheet = render_grid(&create_test_snapshot());
        let grid = &sheet.grid;

        assert_eq!(grid.cell(0, 0), &Cell::text("STOCK DETAILS"));
        assert!(grid.row(1).is_empty());
        assert_eq!(grid.cell(2, 0), &Cell::text("PURCHASE - STOCK IN"));
        assert_eq!(grid.cell(3, 5), &Cell::text("Qty."));
        assert_eq!(grid.cell(4, 1), &Cell::text("Shampoo"));
        assert!(grid.row(5).is_empty());
        assert_eq!(grid.cell(6, 0), &Cell::text("SALES TO CUSTOMER - STOCK OUT"));
        assert_eq!(grid.row(8).len(), 25);
        assert_eq!(sheet.bold_rows, vec![0, 2, 3, 6, 7, 10, 11, 14, 15]);
    }

    #[test]
    fn test_balance_omitted_when_absent() {
        let mut snapshot = create_test_snapshot();
        snapshot.balance = None;
        let sheet = render_grid(&snapshot);
        assert!(!sheet
            .grid
            .rows()
            .any(|row| row.first() == Some(&Cell::text("BALANCE STOCK"))));
    }

    #[test]
    fn test_render_parse_render_round_trip() {
        let original = create_test_snapshot();
        let first = render_grid(&original);
        let parsed = parse_grid(&first.grid, &LedgerConfig::default()).unwrap();

        assert_eq!(without_ids(parsed.clone()), without_ids(original));
        assert_eq!(render_grid(&parsed), first);
        assert_eq!(parsed.products.len(), 2);
    }

    #[test]
    fn test_round_trip_through_xlsx_bytes() {
        let original = create_test_snapshot();
        let bytes = render_workbook(&original, "STOCK DETAILS").unwrap();
        let grid = WorkbookSource::new("STOCK DETAILS").load(&bytes).unwrap();
        let parsed = parse_grid(&grid, &LedgerConfig::default()).unwrap();

        assert_eq!(without_ids(parsed.clone()), without_ids(original.clone()));
        assert!(!render_workbook(&parsed, "STOCK DETAILS").unwrap().is_empty());
    }
}

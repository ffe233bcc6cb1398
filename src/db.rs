// 🗄️ Ledger store - SQLite schema, audit events and row-level reads/writes
//
// Free functions over a `&Connection`. Callers that need atomicity pass a
// `rusqlite::Transaction`, which derefs to `Connection`.

use crate::error::{LedgerError, Result};
use crate::model::{
    BalanceLine, Consumption, Product, ProductKey, Purchase, Sale, TaxAmounts,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What an audit entry records. Each kind is filed against one subject:
/// the workbook digest, the converted sale, or the POS order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    WorkbookIngested,
    SalesConverted,
    PosOrderSynced,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::WorkbookIngested => "workbook_ingested",
            LedgerEventKind::SalesConverted => "sales_converted",
            LedgerEventKind::PosOrderSynced => "pos_order_synced",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "workbook_ingested" => Some(LedgerEventKind::WorkbookIngested),
            "sales_converted" => Some(LedgerEventKind::SalesConverted),
            "pos_order_synced" => Some(LedgerEventKind::PosOrderSynced),
            _ => None,
        }
    }
}

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEvent {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub kind: LedgerEventKind,
    pub subject: String,
    pub details: serde_json::Value,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Stored date for a record; undated records are booked today.
fn stored_date(date: Option<NaiveDate>) -> String {
    date.unwrap_or_else(|| Utc::now().date_naive())
        .format(DATE_FORMAT)
        .to_string()
}

fn read_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()))
}

fn read_amounts(row: &Row, first: usize) -> rusqlite::Result<TaxAmounts> {
    Ok(TaxAmounts {
        taxable_value: row.get(first)?,
        igst: row.get(first + 1)?,
        cgst: row.get(first + 2)?,
        sgst: row.get(first + 3)?,
        total: row.get(first + 4)?,
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            hsn_code TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(name, hsn_code)
        );

        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            date TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            invoice_no TEXT NOT NULL DEFAULT '',
            qty REAL NOT NULL DEFAULT 0,
            price_incl_gst REAL NOT NULL DEFAULT 0,
            price_ex_gst REAL NOT NULL DEFAULT 0,
            discount_percentage REAL NOT NULL DEFAULT 0,
            cost_per_unit_ex_gst REAL NOT NULL DEFAULT 0,
            gst_percentage REAL NOT NULL DEFAULT 0,
            taxable_value REAL NOT NULL DEFAULT 0,
            igst REAL NOT NULL DEFAULT 0,
            cgst REAL NOT NULL DEFAULT 0,
            sgst REAL NOT NULL DEFAULT 0,
            invoice_value REAL NOT NULL DEFAULT 0,
            supplier TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            date TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            invoice_no TEXT NOT NULL DEFAULT '',
            qty REAL NOT NULL DEFAULT 0,
            purchase_cost_per_unit_ex_gst REAL NOT NULL DEFAULT 0,
            purchase_gst_percentage REAL NOT NULL DEFAULT 0,
            purchase_taxable_value REAL NOT NULL DEFAULT 0,
            purchase_igst REAL NOT NULL DEFAULT 0,
            purchase_cgst REAL NOT NULL DEFAULT 0,
            purchase_sgst REAL NOT NULL DEFAULT 0,
            total_purchase_cost REAL NOT NULL DEFAULT 0,
            mrp_incl_gst REAL NOT NULL DEFAULT 0,
            mrp_ex_gst REAL NOT NULL DEFAULT 0,
            discount_percentage REAL NOT NULL DEFAULT 0,
            discounted_rate_ex_gst REAL NOT NULL DEFAULT 0,
            sales_gst_percentage REAL NOT NULL DEFAULT 0,
            taxable_value REAL NOT NULL DEFAULT 0,
            igst REAL NOT NULL DEFAULT 0,
            cgst REAL NOT NULL DEFAULT 0,
            sgst REAL NOT NULL DEFAULT 0,
            invoice_value REAL NOT NULL DEFAULT 0,
            customer TEXT NOT NULL DEFAULT '',
            payment_method TEXT NOT NULL DEFAULT '',
            converted INTEGER NOT NULL DEFAULT 0,
            converted_at TEXT,
            consumption_id TEXT,
            pos_order_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS consumption (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            date TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            voucher_no TEXT NOT NULL DEFAULT '',
            qty REAL NOT NULL DEFAULT 0,
            cost_per_unit_ex_gst REAL NOT NULL DEFAULT 0,
            gst_percentage REAL NOT NULL DEFAULT 0,
            taxable_value REAL NOT NULL DEFAULT 0,
            igst REAL NOT NULL DEFAULT 0,
            cgst REAL NOT NULL DEFAULT 0,
            sgst REAL NOT NULL DEFAULT 0,
            total_purchase_cost REAL NOT NULL DEFAULT 0,
            purpose TEXT NOT NULL DEFAULT '',
            original_sale_id TEXT REFERENCES sales(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS balance_stock (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL UNIQUE REFERENCES products(id),
            unit TEXT NOT NULL DEFAULT '',
            qty REAL NOT NULL DEFAULT 0,
            taxable_value REAL NOT NULL DEFAULT 0,
            igst REAL NOT NULL DEFAULT 0,
            cgst REAL NOT NULL DEFAULT 0,
            sgst REAL NOT NULL DEFAULT 0,
            invoice_value REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            recorded_at TEXT NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            details TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_purchases_product ON purchases(product_id);
        CREATE INDEX IF NOT EXISTS idx_sales_product ON sales(product_id);
        CREATE INDEX IF NOT EXISTS idx_sales_payment ON sales(payment_method, converted);
        CREATE INDEX IF NOT EXISTS idx_sales_pos_order ON sales(pos_order_id);
        CREATE INDEX IF NOT EXISTS idx_consumption_product ON consumption(product_id);
        CREATE INDEX IF NOT EXISTS idx_events_subject ON events(kind, subject);",
    )?;

    Ok(())
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Append an entry to the audit trail and return it.
pub fn record_event(
    conn: &Connection,
    kind: LedgerEventKind,
    subject: &str,
    details: serde_json::Value,
) -> Result<LedgerEvent> {
    let event = LedgerEvent {
        id: uuid::Uuid::new_v4().to_string(),
        recorded_at: Utc::now(),
        kind,
        subject: subject.to_string(),
        details,
    };

    conn.execute(
        "INSERT INTO events (id, recorded_at, kind, subject, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id,
            event.recorded_at.to_rfc3339(),
            kind.as_str(),
            event.subject,
            serde_json::to_string(&event.details)?,
        ],
    )?;

    Ok(event)
}

fn conversion_failure(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn read_event(row: &Row) -> rusqlite::Result<LedgerEvent> {
    let recorded_at: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let details: String = row.get(4)?;

    Ok(LedgerEvent {
        id: row.get(0)?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| conversion_failure(1, e))?
            .with_timezone(&Utc),
        kind: LedgerEventKind::parse(&kind)
            .ok_or_else(|| conversion_failure(2, format!("unknown event kind {}", kind)))?,
        subject: row.get(3)?,
        details: serde_json::from_str(&details).map_err(|e| conversion_failure(4, e))?,
    })
}

/// Entries of one kind, oldest first. With a subject, only that subject's.
pub fn get_events(
    conn: &Connection,
    kind: LedgerEventKind,
    subject: Option<&str>,
) -> Result<Vec<LedgerEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, recorded_at, kind, subject, details
         FROM events
         WHERE kind = ?1 AND (?2 IS NULL OR subject = ?2)
         ORDER BY recorded_at, rowid",
    )?;

    let events = stmt
        .query_map(params![kind.as_str(), subject], read_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

// ============================================================================
// PRODUCTS
// ============================================================================

/// Insert the product, or refresh the unit of the stored one with the same
/// (name, HSN code). Returns the stored id, which wins over `product.id`.
pub fn upsert_product(conn: &Connection, product: &Product) -> Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM products WHERE name = ?1 AND hsn_code = ?2",
            params![product.name, product.hsn_code],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE products SET unit = ?1, updated_at = ?2 WHERE id = ?3",
                params![product.unit, now(), id],
            )?;
            Ok(id)
        }
        None => {
            let ts = now();
            conn.execute(
                "INSERT INTO products (id, name, hsn_code, unit, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![product.id, product.name, product.hsn_code, product.unit, ts],
            )?;
            Ok(product.id.clone())
        }
    }
}

/// Id of the stored product for `key`; a missing product is an integrity
/// violation, never silently skipped.
pub fn product_id_for(conn: &Connection, key: &ProductKey) -> Result<String> {
    conn.query_row(
        "SELECT id FROM products WHERE name = ?1 AND hsn_code = ?2",
        params![key.name, key.hsn_code],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LedgerError::UnknownProduct {
        name: key.name.clone(),
        hsn_code: key.hsn_code.clone(),
    })
}

pub fn get_product(conn: &Connection, product_id: &str) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            "SELECT id, name, hsn_code, unit FROM products WHERE id = ?1",
            params![product_id],
            |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    hsn_code: row.get(2)?,
                    unit: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(product)
}

pub fn get_all_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt =
        conn.prepare("SELECT id, name, hsn_code, unit FROM products ORDER BY created_at, rowid")?;
    let products = stmt
        .query_map([], |row| {
            Ok(Product {
                id: row.get(0)?,
                name: row.get(1)?,
                hsn_code: row.get(2)?,
                unit: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(products)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

pub fn insert_purchase(conn: &Connection, purchase: &Purchase, product_id: &str) -> Result<()> {
    let a = &purchase.amounts;
    conn.execute(
        "INSERT INTO purchases (
            id, product_id, date, unit, invoice_no, qty, price_incl_gst, price_ex_gst,
            discount_percentage, cost_per_unit_ex_gst, gst_percentage,
            taxable_value, igst, cgst, sgst, invoice_value, supplier, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            purchase.id,
            product_id,
            stored_date(purchase.date),
            purchase.unit,
            purchase.invoice_no,
            purchase.qty,
            purchase.price_incl_gst,
            purchase.price_ex_gst,
            purchase.discount_percentage,
            purchase.cost_per_unit_ex_gst,
            purchase.gst_percentage,
            a.taxable_value,
            a.igst,
            a.cgst,
            a.sgst,
            a.total,
            purchase.supplier,
            now(),
        ],
    )?;
    Ok(())
}

/// Insert a sale. `pos_order_id` is set for sales synced from the point of sale.
pub fn insert_sale(
    conn: &Connection,
    sale: &Sale,
    product_id: &str,
    pos_order_id: Option<&str>,
) -> Result<()> {
    let cost = &sale.purchase_cost;
    let a = &sale.amounts;
    conn.execute(
        "INSERT INTO sales (
            id, product_id, date, unit, invoice_no, qty,
            purchase_cost_per_unit_ex_gst, purchase_gst_percentage,
            purchase_taxable_value, purchase_igst, purchase_cgst, purchase_sgst,
            total_purchase_cost, mrp_incl_gst, mrp_ex_gst, discount_percentage,
            discounted_rate_ex_gst, sales_gst_percentage,
            taxable_value, igst, cgst, sgst, invoice_value,
            customer, payment_method, converted, pos_order_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
        params![
            sale.id,
            product_id,
            stored_date(sale.date),
            sale.unit,
            sale.invoice_no,
            sale.qty,
            sale.purchase_cost_per_unit_ex_gst,
            sale.purchase_gst_percentage,
            cost.taxable_value,
            cost.igst,
            cost.cgst,
            cost.sgst,
            cost.total,
            sale.mrp_incl_gst,
            sale.mrp_ex_gst,
            sale.discount_percentage,
            sale.discounted_rate_ex_gst,
            sale.sales_gst_percentage,
            a.taxable_value,
            a.igst,
            a.cgst,
            a.sgst,
            a.total,
            sale.customer,
            sale.payment_method,
            sale.converted,
            pos_order_id,
            now(),
        ],
    )?;
    Ok(())
}

pub fn insert_consumption(
    conn: &Connection,
    consumption: &Consumption,
    product_id: &str,
) -> Result<()> {
    let a = &consumption.amounts;
    conn.execute(
        "INSERT INTO consumption (
            id, product_id, date, unit, voucher_no, qty, cost_per_unit_ex_gst,
            gst_percentage, taxable_value, igst, cgst, sgst, total_purchase_cost,
            purpose, original_sale_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            consumption.id,
            product_id,
            stored_date(consumption.date),
            consumption.unit,
            consumption.voucher_no,
            consumption.qty,
            consumption.cost_per_unit_ex_gst,
            consumption.gst_percentage,
            a.taxable_value,
            a.igst,
            a.cgst,
            a.sgst,
            a.total,
            consumption.purpose,
            consumption.original_sale_id,
            now(),
        ],
    )?;
    Ok(())
}

/// Flag a sale as reclassified. Returns the number of rows changed (0 when
/// the sale was already converted).
pub fn mark_sale_converted(conn: &Connection, sale_id: &str, consumption_id: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE sales SET converted = 1, converted_at = ?1, consumption_id = ?2
         WHERE id = ?3 AND converted = 0",
        params![now(), consumption_id, sale_id],
    )?;
    Ok(changed)
}

pub fn pos_order_exists(conn: &Connection, order_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sales WHERE pos_order_id = ?1 LIMIT 1",
            params![order_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Average ex-GST purchase cost per unit over every stored purchase of the
/// product. 0 when the product was never purchased.
pub fn average_purchase_cost(conn: &Connection, product_id: &str) -> Result<f64> {
    let (taxable, qty): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(taxable_value), 0.0), COALESCE(SUM(qty), 0.0)
         FROM purchases WHERE product_id = ?1",
        params![product_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if qty > 0.0 {
        Ok(taxable / qty)
    } else {
        Ok(0.0)
    }
}

// ============================================================================
// BALANCE STOCK
// ============================================================================

/// Replace the product's balance row with the sheet's figures.
pub fn replace_balance(conn: &Connection, product_id: &str, line: &BalanceLine) -> Result<()> {
    let a = &line.amounts;
    let updated = conn.execute(
        "UPDATE balance_stock
         SET unit = ?1, qty = ?2, taxable_value = ?3, igst = ?4, cgst = ?5, sgst = ?6,
             invoice_value = ?7, updated_at = ?8
         WHERE product_id = ?9",
        params![line.unit, line.qty, a.taxable_value, a.igst, a.cgst, a.sgst, a.total, now(), product_id],
    )?;

    if updated == 0 {
        let created_at = now();
        conn.execute(
            "INSERT INTO balance_stock (
                id, product_id, unit, qty, taxable_value, igst, cgst, sgst, invoice_value,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                uuid::Uuid::new_v4().to_string(),
                product_id,
                line.unit,
                line.qty,
                a.taxable_value,
                a.igst,
                a.cgst,
                a.sgst,
                a.total,
                created_at,
                created_at,
            ],
        )?;
    }
    Ok(())
}

/// Take `qty` units and their cost out of the product's balance. A product
/// with no balance row gets one seeded at the negated amounts.
pub fn decrement_balance(
    conn: &Connection,
    product_id: &str,
    unit: &str,
    qty: f64,
    cost: &TaxAmounts,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE balance_stock
         SET qty = qty - ?1, taxable_value = taxable_value - ?2, igst = igst - ?3,
             cgst = cgst - ?4, sgst = sgst - ?5, invoice_value = invoice_value - ?6,
             updated_at = ?7
         WHERE product_id = ?8",
        params![qty, cost.taxable_value, cost.igst, cost.cgst, cost.sgst, cost.total, now(), product_id],
    )?;

    if updated == 0 {
        let line = BalanceLine {
            product: ProductKey::new("", ""),
            unit: unit.to_string(),
            qty: -qty,
            amounts: cost.negated(),
        };
        replace_balance(conn, product_id, &line)?;
    }
    Ok(())
}

// ============================================================================
// READS (export, listings)
// ============================================================================

pub fn get_all_purchases(conn: &Connection) -> Result<Vec<Purchase>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.date, pr.name, pr.hsn_code, p.unit, p.invoice_no, p.qty,
                p.price_incl_gst, p.price_ex_gst, p.discount_percentage,
                p.cost_per_unit_ex_gst, p.gst_percentage,
                p.taxable_value, p.igst, p.cgst, p.sgst, p.invoice_value, p.supplier
         FROM purchases p JOIN products pr ON pr.id = p.product_id
         ORDER BY p.date, p.rowid",
    )?;
    let purchases = stmt
        .query_map([], |row| {
            Ok(Purchase {
                id: row.get(0)?,
                date: read_date(row, 1)?,
                product: ProductKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                unit: row.get(4)?,
                invoice_no: row.get(5)?,
                qty: row.get(6)?,
                price_incl_gst: row.get(7)?,
                price_ex_gst: row.get(8)?,
                discount_percentage: row.get(9)?,
                cost_per_unit_ex_gst: row.get(10)?,
                gst_percentage: row.get(11)?,
                amounts: read_amounts(row, 12)?,
                supplier: row.get(17)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(purchases)
}

/// Sales still standing as sales; converted ones live on as consumption.
pub fn get_active_sales(conn: &Connection) -> Result<Vec<Sale>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.date, pr.name, pr.hsn_code, s.unit, s.invoice_no, s.qty,
                s.purchase_cost_per_unit_ex_gst, s.purchase_gst_percentage,
                s.purchase_taxable_value, s.purchase_igst, s.purchase_cgst, s.purchase_sgst,
                s.total_purchase_cost, s.mrp_incl_gst, s.mrp_ex_gst, s.discount_percentage,
                s.discounted_rate_ex_gst, s.sales_gst_percentage,
                s.taxable_value, s.igst, s.cgst, s.sgst, s.invoice_value,
                s.customer, s.payment_method, s.converted
         FROM sales s JOIN products pr ON pr.id = s.product_id
         WHERE s.converted = 0
         ORDER BY s.date, s.rowid",
    )?;
    let sales = stmt
        .query_map([], |row| {
            Ok(Sale {
                id: row.get(0)?,
                date: read_date(row, 1)?,
                product: ProductKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                unit: row.get(4)?,
                invoice_no: row.get(5)?,
                qty: row.get(6)?,
                purchase_cost_per_unit_ex_gst: row.get(7)?,
                purchase_gst_percentage: row.get(8)?,
                purchase_cost: read_amounts(row, 9)?,
                mrp_incl_gst: row.get(14)?,
                mrp_ex_gst: row.get(15)?,
                discount_percentage: row.get(16)?,
                discounted_rate_ex_gst: row.get(17)?,
                sales_gst_percentage: row.get(18)?,
                amounts: read_amounts(row, 19)?,
                customer: row.get(24)?,
                payment_method: row.get(25)?,
                converted: row.get(26)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sales)
}

pub fn get_all_consumption(conn: &Connection) -> Result<Vec<Consumption>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.date, pr.name, pr.hsn_code, c.unit, c.voucher_no, c.qty,
                c.cost_per_unit_ex_gst, c.gst_percentage,
                c.taxable_value, c.igst, c.cgst, c.sgst, c.total_purchase_cost,
                c.purpose, c.original_sale_id
         FROM consumption c JOIN products pr ON pr.id = c.product_id
         ORDER BY c.date, c.rowid",
    )?;
    let consumption = stmt
        .query_map([], |row| {
            Ok(Consumption {
                id: row.get(0)?,
                date: read_date(row, 1)?,
                product: ProductKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                unit: row.get(4)?,
                voucher_no: row.get(5)?,
                qty: row.get(6)?,
                cost_per_unit_ex_gst: row.get(7)?,
                gst_percentage: row.get(8)?,
                amounts: read_amounts(row, 9)?,
                purpose: row.get(14)?,
                original_sale_id: row.get(15)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(consumption)
}

pub fn get_balance(conn: &Connection) -> Result<Vec<BalanceLine>> {
    let mut stmt = conn.prepare(
        "SELECT pr.name, pr.hsn_code, b.unit, b.qty,
                b.taxable_value, b.igst, b.cgst, b.sgst, b.invoice_value
         FROM balance_stock b JOIN products pr ON pr.id = b.product_id
         ORDER BY pr.created_at, pr.rowid",
    )?;
    let lines = stmt
        .query_map([], |row| {
            Ok(BalanceLine {
                product: ProductKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                unit: row.get(2)?,
                qty: row.get(3)?,
                amounts: read_amounts(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lines)
}

pub fn get_balance_for(conn: &Connection, product_id: &str) -> Result<Option<BalanceLine>> {
    let line = conn
        .query_row(
            "SELECT pr.name, pr.hsn_code, b.unit, b.qty,
                    b.taxable_value, b.igst, b.cgst, b.sgst, b.invoice_value
             FROM balance_stock b JOIN products pr ON pr.id = b.product_id
             WHERE b.product_id = ?1",
            params![product_id],
            |row| {
                Ok(BalanceLine {
                    product: ProductKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    unit: row.get(2)?,
                    qty: row.get(3)?,
                    amounts: read_amounts(row, 4)?,
                })
            },
        )
        .optional()?;
    Ok(line)
}

#[cfg(test)]
pub(crate) fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn create_test_product(name: &str, hsn: &str, unit: &str) -> Product {
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            hsn_code: hsn.to_string(),
            unit: unit.to_string(),
        }
    }

    fn create_test_purchase(name: &str, hsn: &str, qty: f64, taxable: f64) -> Purchase {
        Purchase {
            id: uuid::Uuid::new_v4().to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            product: ProductKey::new(name, hsn),
            unit: "BTL".to_string(),
            invoice_no: "INV1".to_string(),
            qty,
            price_incl_gst: 0.0,
            price_ex_gst: 0.0,
            discount_percentage: 0.0,
            cost_per_unit_ex_gst: taxable / qty,
            gst_percentage: 0.18,
            amounts: TaxAmounts::intrastate(taxable, 0.18),
            supplier: String::new(),
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = create_test_db();
        setup_database(&conn).unwrap();
        assert_eq!(count_rows(&conn, "products"), 0);
    }

    #[test]
    fn test_upsert_product_updates_unit_in_place() {
        let conn = create_test_db();
        let first = create_test_product("Shampoo", "330510", "BTL");
        let id = upsert_product(&conn, &first).unwrap();
        assert_eq!(id, first.id);

        let again = create_test_product("Shampoo", "330510", "PCS");
        let id2 = upsert_product(&conn, &again).unwrap();
        assert_eq!(id2, first.id, "existing id must be kept");

        let stored = get_product(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.unit, "PCS");
        assert_eq!(count_rows(&conn, "products"), 1);
    }

    #[test]
    fn test_unknown_product_is_integrity_violation() {
        let conn = create_test_db();
        let err = product_id_for(&conn, &ProductKey::new("Ghost", "0000")).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownProduct { .. }));
    }

    #[test]
    fn test_missing_date_booked_today() {
        let conn = create_test_db();
        let product = create_test_product("Gel", "3305", "TUBE");
        let id = upsert_product(&conn, &product).unwrap();

        let mut purchase = create_test_purchase("Gel", "3305", 2.0, 100.0);
        purchase.date = None;
        insert_purchase(&conn, &purchase, &id).unwrap();

        let stored = get_all_purchases(&conn).unwrap();
        assert_eq!(stored[0].date, Some(Utc::now().date_naive()));
    }

    #[test]
    fn test_average_purchase_cost() {
        let conn = create_test_db();
        let product = create_test_product("Shampoo", "330510", "BTL");
        let id = upsert_product(&conn, &product).unwrap();
        assert_eq!(average_purchase_cost(&conn, &id).unwrap(), 0.0);

        insert_purchase(&conn, &create_test_purchase("Shampoo", "330510", 10.0, 1000.0), &id).unwrap();
        insert_purchase(&conn, &create_test_purchase("Shampoo", "330510", 10.0, 1200.0), &id).unwrap();
        assert!((average_purchase_cost(&conn, &id).unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_replace_then_decrement_balance() {
        let conn = create_test_db();
        let product = create_test_product("Shampoo", "330510", "BTL");
        let id = upsert_product(&conn, &product).unwrap();

        let line = BalanceLine {
            product: product.key(),
            unit: "BTL".to_string(),
            qty: 10.0,
            amounts: TaxAmounts::intrastate(1000.0, 0.18),
        };
        replace_balance(&conn, &id, &line).unwrap();
        replace_balance(&conn, &id, &line).unwrap();
        assert_eq!(count_rows(&conn, "balance_stock"), 1);

        decrement_balance(&conn, &id, "BTL", 2.0, &TaxAmounts::intrastate(200.0, 0.18)).unwrap();
        let stored = get_balance_for(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.qty, 8.0);
        assert!((stored.amounts.taxable_value - 800.0).abs() < 1e-9);
        assert!((stored.amounts.total - 944.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_created_at_survives_replace() {
        let conn = create_test_db();
        let product = create_test_product("Shampoo", "330510", "BTL");
        let id = upsert_product(&conn, &product).unwrap();
        let mut line = BalanceLine {
            product: product.key(),
            unit: "BTL".to_string(),
            qty: 10.0,
            amounts: TaxAmounts::intrastate(1000.0, 0.18),
        };

        let stamps = |conn: &Connection| -> (String, String) {
            conn.query_row(
                "SELECT created_at, updated_at FROM balance_stock WHERE product_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
        };

        replace_balance(&conn, &id, &line).unwrap();
        let (created, updated) = stamps(&conn);
        assert!(DateTime::parse_from_rfc3339(&created).is_ok());
        assert_eq!(created, updated);

        line.qty = 4.0;
        replace_balance(&conn, &id, &line).unwrap();
        let (created_again, _) = stamps(&conn);
        assert_eq!(created_again, created);
    }

    #[test]
    fn test_decrement_seeds_negative_balance() {
        let conn = create_test_db();
        let product = create_test_product("Wax", "340520", "JAR");
        let id = upsert_product(&conn, &product).unwrap();

        decrement_balance(&conn, &id, "JAR", 3.0, &TaxAmounts::intrastate(150.0, 0.18)).unwrap();
        let stored = get_balance_for(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.qty, -3.0);
        assert_eq!(stored.amounts.taxable_value, -150.0);
        assert_eq!(stored.product.name, "Wax");
    }

    #[test]
    fn test_event_log() {
        let conn = create_test_db();

        record_event(
            &conn,
            LedgerEventKind::WorkbookIngested,
            "digest-1",
            serde_json::json!({ "source": "stock.xlsx" }),
        )
        .unwrap();
        record_event(&conn, LedgerEventKind::WorkbookIngested, "digest-2", serde_json::json!({}))
            .unwrap();

        let events = get_events(&conn, LedgerEventKind::WorkbookIngested, Some("digest-1")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, LedgerEventKind::WorkbookIngested);
        assert_eq!(events[0].details["source"], "stock.xlsx");

        assert_eq!(get_events(&conn, LedgerEventKind::WorkbookIngested, None).unwrap().len(), 2);
        assert!(get_events(&conn, LedgerEventKind::PosOrderSynced, None).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_event_details_is_read_error() {
        let conn = create_test_db();
        conn.execute(
            "INSERT INTO events (id, recorded_at, kind, subject, details)
             VALUES ('e1', ?1, 'workbook_ingested', 's', '{}'),
                    ('e2', ?1, 'workbook_ingested', 's', 'not json')",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();

        let err = get_events(&conn, LedgerEventKind::WorkbookIngested, Some("s")).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
    }
}

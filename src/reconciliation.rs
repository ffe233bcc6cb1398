// ⚖️ Reconciliation Writer - persist parsed sheets, reclassify cash sales
//
// Bulk ingestion and sale→consumption reclassification are both
// all-or-nothing: each runs inside one SQLite transaction that is only
// committed after the last write succeeded. Dropping the transaction on an
// early `?` return rolls everything back.

use crate::db::{self, LedgerEventKind};
use crate::error::{LedgerError, Result};
use crate::model::{Consumption, ProductKey, StockSnapshot, TaxAmounts};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payment method a sale must carry to be reclassified.
pub const CASH_PAYMENT: &str = "cash";

/// Purpose recorded on consumption created from a cash sale.
pub const CONVERTED_PURPOSE: &str = "Converted from cash sale";

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub products: usize,
    pub purchases: usize,
    pub sales: usize,
    pub consumption: usize,
    pub balance: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub converted_count: usize,
    pub consumption_ids: Vec<String>,
}

/// Cash sale still eligible for reclassification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashSale {
    pub id: String,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub product: ProductKey,
    pub unit: String,
    pub invoice_no: String,
    pub qty: f64,
    pub invoice_value: f64,
    pub customer: String,
}

// ============================================================================
// BULK INGESTION
// ============================================================================

/// Write a parsed snapshot in one transaction.
///
/// Products are upserted first; every record then resolves its owning
/// product through the ids returned by that pass, falling back to the store.
/// A record whose product exists in neither aborts the whole ingestion.
pub fn store_snapshot(
    conn: &mut Connection,
    snapshot: &StockSnapshot,
    source_name: &str,
    digest: &str,
) -> Result<IngestSummary> {
    let tx = conn.transaction()?;

    let mut product_ids: HashMap<ProductKey, String> = HashMap::new();
    for product in &snapshot.products {
        let id = db::upsert_product(&tx, product)?;
        product_ids.insert(product.key(), id);
    }

    let resolve = |key: &ProductKey| -> Result<String> {
        match product_ids.get(key) {
            Some(id) => Ok(id.clone()),
            None => db::product_id_for(&tx, key),
        }
    };

    for purchase in &snapshot.purchases {
        db::insert_purchase(&tx, purchase, &resolve(&purchase.product)?)?;
    }
    for sale in &snapshot.sales {
        db::insert_sale(&tx, sale, &resolve(&sale.product)?, None)?;
    }
    for consumption in &snapshot.consumption {
        db::insert_consumption(&tx, consumption, &resolve(&consumption.product)?)?;
    }
    let balance = snapshot.balance.as_deref().unwrap_or(&[]);
    for line in balance {
        db::replace_balance(&tx, &resolve(&line.product)?, line)?;
    }

    let summary = IngestSummary {
        products: snapshot.products.len(),
        purchases: snapshot.purchases.len(),
        sales: snapshot.sales.len(),
        consumption: snapshot.consumption.len(),
        balance: balance.len(),
    };

    db::record_event(
        &tx,
        LedgerEventKind::WorkbookIngested,
        digest,
        serde_json::json!({
            "source": source_name,
            "summary": &summary,
        }),
    )?;

    tx.commit()?;

    log::info!(
        "ingested {}: {} products, {} purchases, {} sales, {} consumption, {} balance",
        source_name,
        summary.products,
        summary.purchases,
        summary.sales,
        summary.consumption,
        summary.balance
    );
    Ok(summary)
}

// ============================================================================
// CASH SALE RECLASSIFICATION
// ============================================================================

struct ConvertibleSale {
    id: String,
    product_id: String,
    product: ProductKey,
    date: Option<NaiveDate>,
    unit: String,
    qty: f64,
    cost_per_unit_ex_gst: f64,
    gst_percentage: f64,
    cost: TaxAmounts,
}

fn parse_stored_date(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Turn the listed cash sales into internal consumption.
///
/// Ids that are not unconverted cash sales are ignored. If none qualify the
/// call fails with `NoConvertibleTransactions` and nothing is written.
pub fn convert_cash_sales(conn: &mut Connection, sale_ids: &[String]) -> Result<ConversionSummary> {
    if sale_ids.is_empty() {
        return Err(LedgerError::NoConvertibleTransactions { requested: 0 });
    }

    let tx = conn.transaction()?;

    let candidates = {
        let placeholders = vec!["?"; sale_ids.len()].join(", ");
        let sql = format!(
            "SELECT s.id, s.product_id, pr.name, pr.hsn_code, s.date, s.unit, s.qty,
                    s.purchase_cost_per_unit_ex_gst, s.purchase_gst_percentage,
                    s.purchase_taxable_value, s.purchase_igst, s.purchase_cgst,
                    s.purchase_sgst, s.total_purchase_cost
             FROM sales s JOIN products pr ON pr.id = s.product_id
             WHERE s.payment_method = '{}' AND s.converted = 0 AND s.id IN ({})
             ORDER BY s.rowid",
            CASH_PAYMENT, placeholders
        );
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sale_ids.iter()), |row| {
                Ok(ConvertibleSale {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    product: ProductKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                    date: parse_stored_date(row.get(4)?),
                    unit: row.get(5)?,
                    qty: row.get(6)?,
                    cost_per_unit_ex_gst: row.get(7)?,
                    gst_percentage: row.get(8)?,
                    cost: TaxAmounts {
                        taxable_value: row.get(9)?,
                        igst: row.get(10)?,
                        cgst: row.get(11)?,
                        sgst: row.get(12)?,
                        total: row.get(13)?,
                    },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    if candidates.is_empty() {
        return Err(LedgerError::NoConvertibleTransactions {
            requested: sale_ids.len(),
        });
    }

    let mut consumption_ids = Vec::with_capacity(candidates.len());
    for sale in &candidates {
        let consumption = Consumption {
            id: uuid::Uuid::new_v4().to_string(),
            date: sale.date,
            product: sale.product.clone(),
            unit: sale.unit.clone(),
            voucher_no: String::new(),
            qty: sale.qty,
            cost_per_unit_ex_gst: sale.cost_per_unit_ex_gst,
            gst_percentage: sale.gst_percentage,
            amounts: sale.cost,
            purpose: CONVERTED_PURPOSE.to_string(),
            original_sale_id: Some(sale.id.clone()),
        };
        db::insert_consumption(&tx, &consumption, &sale.product_id)?;
        db::mark_sale_converted(&tx, &sale.id, &consumption.id)?;

        db::record_event(
            &tx,
            LedgerEventKind::SalesConverted,
            &sale.id,
            serde_json::json!({ "consumption_id": consumption.id }),
        )?;

        consumption_ids.push(consumption.id);
    }

    tx.commit()?;

    log::info!(
        "converted {} of {} requested cash sale(s) to consumption",
        consumption_ids.len(),
        sale_ids.len()
    );
    Ok(ConversionSummary {
        converted_count: consumption_ids.len(),
        consumption_ids,
    })
}

/// Cash sales not yet converted, most recent first.
pub fn list_unconverted_cash_sales(conn: &Connection) -> Result<Vec<CashSale>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.date, pr.name, pr.hsn_code, s.unit, s.invoice_no, s.qty,
                s.invoice_value, s.customer
         FROM sales s JOIN products pr ON pr.id = s.product_id
         WHERE s.payment_method = ?1 AND s.converted = 0
         ORDER BY s.date DESC, s.created_at DESC, s.rowid DESC",
    )?;
    let sales = stmt
        .query_map([CASH_PAYMENT], |row| {
            Ok(CashSale {
                id: row.get(0)?,
                date: parse_stored_date(row.get(1)?),
                product: ProductKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                unit: row.get(4)?,
                invoice_no: row.get(5)?,
                qty: row.get(6)?,
                invoice_value: row.get(7)?,
                customer: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sales)
}

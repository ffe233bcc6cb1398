// 🧾 Point-of-sale sync - book POS orders as sales, one transaction per order
//
// Unlike bulk ingestion, balance stock is decremented here rather than
// replaced. Each order commits on its own, so a failing order is reported
// and its siblings still go through.

use crate::config::LedgerConfig;
use crate::db::{self, LedgerEventKind};
use crate::error::{LedgerError, Result};
use crate::model::{Sale, TaxAmounts};
use crate::normalize::round_amount;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

// ============================================================================
// INPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosOrder {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Interstate supply books the whole tax to IGST.
    #[serde(default)]
    pub interstate: bool,
    #[serde(default, alias = "lines")]
    pub services: Vec<PosLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosLine {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Services without a product don't move stock and are skipped.
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: f64,
    /// Unit price including GST.
    pub price: f64,
    /// GST rate as a fraction (0.18 = 18%).
    #[serde(default)]
    pub gst_percentage: Option<f64>,
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedSale {
    pub order_id: String,
    pub sale_id: String,
    pub product_id: String,
    pub qty: f64,
    pub invoice_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosSyncReport {
    /// Orders committed in this run.
    pub processed: usize,
    /// Orders already booked by an earlier run.
    pub skipped: usize,
    pub errors: Vec<String>,
    pub sales: Vec<SyncedSale>,
}

// ============================================================================
// SYNC
// ============================================================================

fn split_tax(taxable_value: f64, rate: f64, interstate: bool) -> TaxAmounts {
    let amounts = if interstate {
        TaxAmounts::interstate(taxable_value, rate)
    } else {
        TaxAmounts::intrastate(taxable_value, rate)
    };
    amounts.rounded()
}

/// Price a POS line as a sale, costing it at the product's average purchase cost.
fn build_sale(
    conn: &Connection,
    order: &PosOrder,
    line: &PosLine,
    product_id: &str,
    config: &LedgerConfig,
) -> Result<Sale> {
    let product = db::get_product(conn, product_id)?.ok_or_else(|| LedgerError::UnknownProduct {
        name: if line.name.is_empty() {
            product_id.to_string()
        } else {
            line.name.clone()
        },
        hsn_code: String::new(),
    })?;

    let rate = line.gst_percentage.unwrap_or(config.default_gst_rate);
    let cost_per_unit = db::average_purchase_cost(conn, product_id)?;
    let purchase_cost = split_tax(cost_per_unit * line.quantity, rate, order.interstate);

    let mrp_ex_gst = line.price / (1.0 + rate);
    let amounts = split_tax(mrp_ex_gst * line.quantity, rate, order.interstate);

    let date: Option<NaiveDate> = Some(
        order
            .created_at
            .map(|ts| ts.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive()),
    );

    Ok(Sale {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        product: product.key(),
        unit: product.unit.clone(),
        invoice_no: order.id.clone(),
        qty: line.quantity,
        purchase_cost_per_unit_ex_gst: round_amount(cost_per_unit),
        purchase_gst_percentage: rate,
        purchase_cost,
        mrp_incl_gst: line.price,
        mrp_ex_gst: round_amount(mrp_ex_gst),
        discount_percentage: 0.0,
        discounted_rate_ex_gst: round_amount(mrp_ex_gst),
        sales_gst_percentage: rate,
        amounts,
        customer: order.customer_name.clone().unwrap_or_default(),
        payment_method: order
            .payment_method
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| config.default_payment_method.clone()),
        converted: false,
    })
}

fn sync_order(conn: &mut Connection, order: &PosOrder, config: &LedgerConfig) -> Result<Vec<SyncedSale>> {
    let tx = conn.transaction()?;
    let mut synced = Vec::new();

    for line in &order.services {
        let Some(product_id) = line.product_id.as_deref() else {
            log::debug!("order {}: service {:?} has no product; skipped", order.id, line.name);
            continue;
        };

        let sale = build_sale(&tx, order, line, product_id, config)?;
        db::insert_sale(&tx, &sale, product_id, Some(&order.id))?;
        db::decrement_balance(&tx, product_id, &sale.unit, sale.qty, &sale.purchase_cost)?;

        synced.push(SyncedSale {
            order_id: order.id.clone(),
            sale_id: sale.id,
            product_id: product_id.to_string(),
            qty: sale.qty,
            invoice_value: sale.amounts.total,
        });
    }

    db::record_event(
        &tx,
        LedgerEventKind::PosOrderSynced,
        &order.id,
        serde_json::json!({ "sales": synced.len() }),
    )?;

    tx.commit()?;
    Ok(synced)
}

/// Book every order not seen before. Per-order failures are collected in
/// the report instead of aborting the run.
pub fn sync_orders(
    conn: &mut Connection,
    orders: &[PosOrder],
    config: &LedgerConfig,
) -> Result<PosSyncReport> {
    let mut report = PosSyncReport::default();

    for order in orders {
        if db::pos_order_exists(conn, &order.id)? {
            report.skipped += 1;
            continue;
        }

        match sync_order(conn, order, config) {
            Ok(sales) => {
                report.processed += 1;
                report.sales.extend(sales);
            }
            Err(e) => {
                log::warn!("POS order {} failed: {}", order.id, e);
                report.errors.push(format!("Error processing order {}: {}", order.id, e));
            }
        }
    }

    log::info!(
        "POS sync: {} processed, {} skipped, {} failed",
        report.processed,
        report.skipped,
        report.errors.len()
    );
    Ok(report)
}

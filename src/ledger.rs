// 📒 StockLedger - one store connection plus one configuration
//
// Entry point for callers: uploads go in as (file name, bytes), structured
// snapshots and workbook bytes come out.

use crate::config::LedgerConfig;
use crate::db::{self, LedgerEventKind};
use crate::error::Result;
use crate::extract::parse_grid;
use crate::grid::{source_for_file, GridSource};
use crate::model::StockSnapshot;
use crate::pos::{sync_orders, PosOrder, PosSyncReport};
use crate::reconciliation::{
    convert_cash_sales, list_unconverted_cash_sales, store_snapshot, CashSale, ConversionSummary,
    IngestSummary,
};
use crate::render;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::Path;

pub struct StockLedger {
    conn: Connection,
    config: LedgerConfig,
}

/// Hex SHA-256 of an uploaded workbook.
pub fn workbook_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl StockLedger {
    pub fn open(path: &Path, config: LedgerConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        db::setup_database(&conn)?;
        Ok(StockLedger { conn, config })
    }

    pub fn open_in_memory(config: LedgerConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::setup_database(&conn)?;
        Ok(StockLedger { conn, config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Load and parse an upload without touching the store.
    pub fn parse_to_structured_preview(&self, file_name: &str, bytes: &[u8]) -> Result<StockSnapshot> {
        let source = source_for_file(file_name, &self.config.sheet_name)?;
        let grid = source.load(bytes)?;
        log::debug!("{} loaded via {} source: {} rows", file_name, source.name(), grid.len());
        parse_grid(&grid, &self.config)
    }

    /// Parse an upload and persist it atomically.
    pub fn extract_and_store(&mut self, file_name: &str, bytes: &[u8]) -> Result<IngestSummary> {
        let snapshot = self.parse_to_structured_preview(file_name, bytes)?;
        let digest = workbook_digest(bytes);

        let previous = db::get_events(&self.conn, LedgerEventKind::WorkbookIngested, Some(&digest))?;
        if !previous.is_empty() {
            log::warn!(
                "{} has the same contents as a workbook ingested {} time(s) before",
                file_name,
                previous.len()
            );
        }

        store_snapshot(&mut self.conn, &snapshot, file_name, &digest)
    }

    pub fn reclassify(&mut self, sale_ids: &[String]) -> Result<ConversionSummary> {
        convert_cash_sales(&mut self.conn, sale_ids)
    }

    pub fn list_unconverted_cash_sales(&self) -> Result<Vec<CashSale>> {
        list_unconverted_cash_sales(&self.conn)
    }

    pub fn sync_point_of_sale_events(&mut self, orders: &[PosOrder]) -> Result<PosSyncReport> {
        sync_orders(&mut self.conn, orders, &self.config)
    }

    pub fn render_workbook(&self, snapshot: &StockSnapshot) -> Result<Vec<u8>> {
        render::render_workbook(snapshot, &self.config.sheet_name)
    }

    /// Everything in the store as a snapshot. Converted sales appear only
    /// as the consumption they became.
    pub fn load_snapshot(&self) -> Result<StockSnapshot> {
        Ok(StockSnapshot {
            purchases: db::get_all_purchases(&self.conn)?,
            sales: db::get_active_sales(&self.conn)?,
            consumption: db::get_all_consumption(&self.conn)?,
            balance: Some(db::get_balance(&self.conn)?),
            products: db::get_all_products(&self.conn)?,
        })
    }

    pub fn export_workbook(&self) -> Result<Vec<u8>> {
        let snapshot = self.load_snapshot()?;
        self.render_workbook(&snapshot)
    }
}

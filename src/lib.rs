// Stock Ledger - Core Library
// Sectioned stock-sheet extraction, reconciliation and POS sync

pub mod columns;        // Column Resolver - positional / header-text field maps
pub mod config;
pub mod db;
pub mod error;
pub mod extract;        // Record Extractor - grid → StockSnapshot
pub mod grid;           // Grid Loader - workbook/CSV bytes ⇄ raw cells
pub mod ledger;
pub mod model;
pub mod normalize;      // Value Normalizer
pub mod pos;
pub mod products;       // Product Identity Resolver
pub mod reconciliation; // Reconciliation Writer
pub mod render;
pub mod sections;       // Section Locator

// Re-export commonly used types
pub use columns::{ColumnStrategy, FieldMap, FieldSpec};
pub use config::{LayoutOptions, LedgerConfig};
pub use db::{setup_database, LedgerEvent, LedgerEventKind};
pub use error::{ErrorCategory, LedgerError, Result};
pub use extract::parse_grid;
pub use grid::{source_for_file, Cell, CsvSource, GridSource, RawGrid, WorkbookSource};
pub use ledger::{workbook_digest, StockLedger};
pub use model::{
    BalanceLine, Consumption, Product, ProductKey, Purchase, Sale, SectionKind, StockRecord,
    StockSnapshot, TaxAmounts, TransactionRecord,
};
pub use normalize::{normalize_numeric, round_amount, standardize_unit};
pub use pos::{PosLine, PosOrder, PosSyncReport, SyncedSale};
pub use products::ProductCatalog;
pub use reconciliation::{CashSale, ConversionSummary, IngestSummary};
pub use render::{render_grid, render_workbook, RenderedSheet};
pub use sections::{locate_sections, SectionBounds, SectionLayout, SentinelScan};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

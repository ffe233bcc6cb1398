use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use stock_ledger::{LedgerConfig, PosOrder, StockLedger, StockSnapshot, VERSION};

#[derive(Parser, Debug)]
#[command(name = "stock-ledger", version, about = "Salon stock sheet import, reconciliation and export")]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// SQLite database (overrides database_path from the config)
    #[arg(long = "db", env = "STOCK_LEDGER_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a stock sheet and store it
    Import { file: PathBuf },
    /// Parse a stock sheet without storing anything
    Preview {
        file: PathBuf,
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cash sales that can still be converted to consumption
    CashSales,
    /// Reclassify cash sales as internal consumption
    Convert {
        #[arg(required = true)]
        sale_ids: Vec<String>,
    },
    /// Book POS orders (JSON array) as sales
    SyncPos { orders: PathBuf },
    /// Write everything in the store to a workbook
    Export { output: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Command::Import { file } => run_import(config, &file),
        Command::Preview { file, json } => run_preview(config, &file, json),
        Command::CashSales => run_cash_sales(config),
        Command::Convert { sale_ids } => run_convert(config, &sale_ids),
        Command::SyncPos { orders } => run_sync_pos(config, &orders),
        Command::Export { output } => run_export(config, &output),
    }
}

fn open_ledger(config: LedgerConfig) -> Result<StockLedger> {
    let db_path = config.database_path.clone();
    StockLedger::open(&db_path, config)
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn read_upload(file: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, bytes))
}

fn print_snapshot_summary(snapshot: &StockSnapshot) {
    println!("✓ Products:    {}", snapshot.products.len());
    println!("✓ Purchases:   {}", snapshot.purchases.len());
    println!("✓ Sales:       {}", snapshot.sales.len());
    println!("✓ Consumption: {}", snapshot.consumption.len());
    match &snapshot.balance {
        Some(lines) => println!("✓ Balance:     {}", lines.len()),
        None => println!("- Balance:     (no BALANCE STOCK section)"),
    }
}

fn run_import(config: LedgerConfig, file: &Path) -> Result<()> {
    println!("🗄️  Stock Ledger {} - Import", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let (name, bytes) = read_upload(file)?;
    let mut ledger = open_ledger(config)?;

    println!("\n📂 Parsing {}...", name);
    let summary = ledger
        .extract_and_store(&name, &bytes)
        .with_context(|| format!("Failed to import {}", name))?;

    println!("\n💾 Stored:");
    println!("✓ Products:    {}", summary.products);
    println!("✓ Purchases:   {}", summary.purchases);
    println!("✓ Sales:       {}", summary.sales);
    println!("✓ Consumption: {}", summary.consumption);
    println!("✓ Balance:     {}", summary.balance);

    Ok(())
}

fn run_preview(config: LedgerConfig, file: &Path, json: bool) -> Result<()> {
    let (name, bytes) = read_upload(file)?;
    let ledger = StockLedger::open_in_memory(config)?;
    let snapshot = ledger
        .parse_to_structured_preview(&name, &bytes)
        .with_context(|| format!("Failed to parse {}", name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("🔍 Preview of {}", name);
        print_snapshot_summary(&snapshot);
    }
    Ok(())
}

fn run_cash_sales(config: LedgerConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let sales = ledger.list_unconverted_cash_sales()?;

    if sales.is_empty() {
        println!("No unconverted cash sales.");
        return Ok(());
    }

    println!("💵 {} unconverted cash sale(s):\n", sales.len());
    for sale in &sales {
        let date = sale
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<30} {:>8.2} {:<5} {:>10.2}  {}",
            sale.id, date, sale.product.name, sale.qty, sale.unit, sale.invoice_value, sale.customer
        );
    }
    Ok(())
}

fn run_convert(config: LedgerConfig, sale_ids: &[String]) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let summary = ledger
        .reclassify(sale_ids)
        .context("Failed to convert cash sales")?;

    println!(
        "✅ Converted {} of {} sale(s) to consumption",
        summary.converted_count,
        sale_ids.len()
    );
    for id in &summary.consumption_ids {
        println!("   consumption {}", id);
    }
    Ok(())
}

fn run_sync_pos(config: LedgerConfig, orders_path: &Path) -> Result<()> {
    let text = fs::read_to_string(orders_path)
        .with_context(|| format!("Failed to read {}", orders_path.display()))?;
    let orders: Vec<PosOrder> =
        serde_json::from_str(&text).context("POS orders must be a JSON array")?;

    let mut ledger = open_ledger(config)?;
    let report = ledger.sync_point_of_sale_events(&orders)?;

    println!("🧾 POS sync");
    println!("✓ Processed: {}", report.processed);
    println!("✓ Skipped (already synced): {}", report.skipped);
    if !report.errors.is_empty() {
        eprintln!("❌ {} order(s) failed:", report.errors.len());
        for error in &report.errors {
            eprintln!("   {}", error);
        }
    }
    Ok(())
}

fn run_export(config: LedgerConfig, output: &Path) -> Result<()> {
    let ledger = open_ledger(config)?;
    let bytes = ledger.export_workbook()?;
    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Exported {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

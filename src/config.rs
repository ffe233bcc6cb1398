// ⚙️ Ledger configuration - sheet layout and business defaults (TOML)

use crate::columns::ColumnStrategy;
use crate::error::{LedgerError, Result};
use crate::sections::SentinelScan;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the stock sheet is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub scan: SentinelScan,
    /// Each marker row is followed by the section's own header row.
    pub local_header_row: bool,
    pub columns: ColumnStrategy,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            scan: SentinelScan::FirstColumn,
            local_header_row: true,
            columns: ColumnStrategy::Positional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub sheet_name: String,
    pub layout: LayoutOptions,
    /// Payment method recorded on sales whose row leaves it blank.
    pub default_payment_method: String,
    /// GST rate applied to POS lines that carry none (0.18 = 18%).
    pub default_gst_rate: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("stock_ledger.db"),
            sheet_name: "STOCK DETAILS".to_string(),
            layout: LayoutOptions::default(),
            default_payment_method: "cash".to_string(),
            default_gst_rate: 0.18,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: LedgerConfig =
            toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.sheet_name.trim().is_empty() {
            return Err(LedgerError::Config("sheet_name must not be empty".to_string()));
        }
        if !(0.0..1.0).contains(&self.default_gst_rate) {
            return Err(LedgerError::Config(format!(
                "default_gst_rate must be a fraction in [0, 1), got {}",
                self.default_gst_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_config_takes_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.sheet_name, "STOCK DETAILS");
        assert_eq!(config.default_payment_method, "cash");
    }

    #[test]
    fn test_partial_layout_override() {
        let config = LedgerConfig::from_toml_str(
            r#"
            default_gst_rate = 0.05

            [layout]
            scan = "whole_row"
            columns = "header_text"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_gst_rate, 0.05);
        assert_eq!(config.layout.scan, SentinelScan::WholeRow);
        assert_eq!(config.layout.columns, ColumnStrategy::HeaderText);
        assert!(config.layout.local_header_row);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let err = LedgerConfig::from_toml_str("default_gst_rate = 18.0").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sheet_name = \"Stock\"").unwrap();
        writeln!(file, "database_path = \"/tmp/ledger.db\"").unwrap();

        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.sheet_name, "Stock");
        assert_eq!(config.database_path, PathBuf::from("/tmp/ledger.db"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = LedgerConfig::load(Path::new("/nonexistent/ledger.toml")).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}

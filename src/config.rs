use crate::error::{InventoryWeeksError, Result};
use crate::schema::Brand;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_N_WEEKS: f64 = 25.0;
pub const DEFAULT_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_ROW_OUTLIER_THRESHOLD: f64 = 10_000_000_000.0;
pub const DEFAULT_AGGREGATE_OUTLIER_THRESHOLD: f64 = 500_000_000_000.0;
pub const DEFAULT_WEEKS_OUTLIER_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SourceFolders {
    #[schemars(description = "Folder holding agency (distributor) stock extracts, one YYYY.MM.csv per month")]
    pub agency_stock_dir: String,

    #[schemars(description = "Folder holding directly-operated stock extracts, one YYYY.MM.csv per month")]
    pub direct_stock_dir: String,

    #[schemars(description = "Folder holding sales extracts, one YYYY.MM.csv per month")]
    pub sales_dir: String,
}

impl Default for SourceFolders {
    fn default() -> Self {
        Self {
            agency_stock_dir: "대리상재고".to_string(),
            direct_stock_dir: "직영재고".to_string(),
            sales_dir: "판매매출".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(description = "Brands to build reports for. Each must be one of MLB, MLB KIDS, DISCOVERY.")]
    pub brands: Vec<Brand>,

    #[schemars(
        description = "Look-ahead window in weeks used to reserve direct-operated stock for planned direct sales when computing warehouse weeks."
    )]
    pub n_weeks: f64,

    #[schemars(description = "Number of CSV rows read per streaming batch.")]
    pub batch_size: usize,

    #[schemars(description = "Absolute amount above which a single aggregated row is reported as an outlier.")]
    pub row_outlier_threshold: f64,

    #[schemars(
        description = "Absolute amount above which a (period, brand, category, channel) total is reported as an outlier."
    )]
    pub aggregate_outlier_threshold: f64,

    #[schemars(description = "Stock weeks at or above which an operation-basis cell is flagged.")]
    pub weeks_outlier_threshold: f64,

    pub sources: SourceFolders,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            brands: Brand::ALL.to_vec(),
            n_weeks: DEFAULT_N_WEEKS,
            batch_size: DEFAULT_BATCH_SIZE,
            row_outlier_threshold: DEFAULT_ROW_OUTLIER_THRESHOLD,
            aggregate_outlier_threshold: DEFAULT_AGGREGATE_OUTLIER_THRESHOLD,
            weeks_outlier_threshold: DEFAULT_WEEKS_OUTLIER_THRESHOLD,
            sources: SourceFolders::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.brands.is_empty() {
            return Err(InventoryWeeksError::InvalidConfig(
                "at least one brand is required".to_string(),
            ));
        }

        if !self.n_weeks.is_finite() || self.n_weeks < 0.0 {
            return Err(InventoryWeeksError::InvalidConfig(format!(
                "n_weeks must be a non-negative number (got {})",
                self.n_weeks
            )));
        }

        if self.batch_size == 0 {
            return Err(InventoryWeeksError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("row_outlier_threshold", self.row_outlier_threshold),
            ("aggregate_outlier_threshold", self.aggregate_outlier_threshold),
            ("weeks_outlier_threshold", self.weeks_outlier_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(InventoryWeeksError::InvalidConfig(format!(
                    "{} must be a positive number (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

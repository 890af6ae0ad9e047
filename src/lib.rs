//! # Stock Weeks Builder
//!
//! Turns monthly raw stock and sales extracts into inventory weeks-of-supply
//! reports, one JSON document per brand.
//!
//! ## Core Concepts
//!
//! - **Sources**: agency stock, directly-operated stock and sales, one CSV
//!   extract per month each, with three different raw schemas
//! - **Reconciliation**: the sources are summed per
//!   `(period, brand, category, subcategory)` and outer-joined, so a key
//!   seen in any source appears once with zeros for the others
//! - **Weeks of supply**: stock divided by the weekly sales rate, with an
//!   explicit "no sales" value instead of a division by zero
//! - **Calendar grid**: every observed year is emitted with all twelve
//!   months at both category and subcategory level
//!
//! ## Example
//!
//! ```rust,ignore
//! use stock_weeks_builder::*;
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let processor = StockWeeksProcessor::new(config, "data")?;
//!
//! if let Some(report) = processor.process_brand("MLB")? {
//!     report.write_to(Path::new("public/data/stock_weeks_MLB.json"))?;
//! }
//! ```

pub mod aggregator;
pub mod auditor;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod normalizer;
pub mod operation;
pub mod pipeline;
pub mod reconciler;
pub mod report;
pub mod rollup;
pub mod schema;
pub mod utils;
pub mod weeks;

pub use aggregator::{AggregatedTable, LoadStats, PartialAggregate, SourceAggregator, SourceTable};
pub use auditor::{FindingScope, OutlierAuditor, OutlierFinding};
pub use config::{PipelineConfig, SourceFolders};
pub use error::{InventoryWeeksError, Result};
pub use maintenance::{prune_year, prune_year_in_file};
pub use normalizer::{CanonicalRecord, HeaderMap, RawRow, RecordNormalizer};
pub use operation::{OperationCalculator, OperationMonth, OperationReport};
pub use pipeline::{LoadedSources, Pipeline, ReportVariant, SourceLayout};
pub use reconciler::{outer_join, reconcile, ReconciledRow};
pub use report::{CategoryReport, ReportAssembler, StockWeeksReport};
pub use rollup::rollup_categories;
pub use schema::*;
pub use weeks::{BaseAmounts, BaseFigures, StockWeeks, WeeksCalculator, WeeksValue};

use log::{debug, info};
use std::path::{Path, PathBuf};

/// Facade over [`Pipeline`] for the common "build everything" calls.
pub struct StockWeeksProcessor {
    pipeline: Pipeline,
}

impl StockWeeksProcessor {
    pub fn new(config: PipelineConfig, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let pipeline = Pipeline::new(config, data_dir)?;
        debug!(
            "Processor ready: brands={:?}, n_weeks={}, batch_size={}",
            pipeline.config().brands,
            pipeline.config().n_weeks,
            pipeline.config().batch_size
        );
        Ok(Self { pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn process_brand(&self, brand: &str) -> Result<Option<StockWeeksReport>> {
        self.pipeline.process_brand(brand)
    }

    pub fn process_brand_operation(&self, brand: &str) -> Result<Option<OperationReport>> {
        self.pipeline.process_brand_operation(brand)
    }

    /// Writes the standard report of every configured brand.
    pub fn build_all(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        info!(
            "Building stock weeks reports for {} brands into {}",
            self.pipeline.config().brands.len(),
            out_dir.display()
        );
        self.pipeline.run(ReportVariant::Standard, out_dir)
    }

    /// Writes the operation-basis report of every configured brand.
    pub fn build_all_operation(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        info!(
            "Building operation-basis reports for {} brands into {}",
            self.pipeline.config().brands.len(),
            out_dir.display()
        );
        self.pipeline.run(ReportVariant::OperationBasis, out_dir)
    }
}

pub fn build_reports(config: PipelineConfig, data_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    StockWeeksProcessor::new(config, data_dir)?.build_all(out_dir)
}

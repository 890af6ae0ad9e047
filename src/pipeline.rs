use crate::aggregator::{AggregatedTable, SourceAggregator, SourceTable};
use crate::auditor::OutlierAuditor;
use crate::config::{PipelineConfig, SourceFolders};
use crate::error::Result;
use crate::operation::{OperationCalculator, OperationReport, OperationReportAssembler};
use crate::reconciler::{reconcile, ReconciledRow};
use crate::report::{ReportAssembler, StockWeeksReport};
use crate::schema::{Brand, Grouping, Period, SourceKind};
use crate::utils::parse_period_stem;
use crate::weeks::WeeksCalculator;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const EXTRACT_EXTENSION: &str = "csv";

/// Where the monthly extracts live: `<data_dir>/<folder>/YYYY.MM.csv`.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    data_dir: PathBuf,
    folders: SourceFolders,
}

impl SourceLayout {
    pub fn new(data_dir: impl Into<PathBuf>, folders: SourceFolders) -> Self {
        Self {
            data_dir: data_dir.into(),
            folders,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn dir_for(&self, kind: SourceKind) -> PathBuf {
        let folder = match kind {
            SourceKind::AgencyStock => &self.folders.agency_stock_dir,
            SourceKind::DirectStock => &self.folders.direct_stock_dir,
            SourceKind::Sales => &self.folders.sales_dir,
        };
        self.data_dir.join(folder)
    }

    pub fn file_for(&self, kind: SourceKind, period: Period) -> PathBuf {
        self.dir_for(kind)
            .join(format!("{}.{}", period.file_stem(), EXTRACT_EXTENSION))
    }

    /// Periods with at least one extract among `kinds`. Files whose stem is
    /// not `YYYY.MM` are ignored; a missing folder contributes nothing.
    pub fn discover_periods(&self, kinds: &[SourceKind]) -> Result<BTreeSet<Period>> {
        let mut periods = BTreeSet::new();

        for &kind in kinds {
            let dir = self.dir_for(kind);
            if !dir.is_dir() {
                debug!("No {} folder at {}", kind, dir.display());
                continue;
            }

            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTRACT_EXTENSION) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match parse_period_stem(stem).and_then(|(year, month)| Period::new(year, month)) {
                    Ok(period) => {
                        periods.insert(period);
                    }
                    Err(_) => debug!("Ignoring {}: not a YYYY.MM extract", path.display()),
                }
            }
        }

        Ok(periods)
    }
}

/// Which report a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportVariant {
    Standard,
    OperationBasis,
}

impl ReportVariant {
    pub fn grouping(&self) -> Grouping {
        match self {
            ReportVariant::Standard => Grouping::Subcategory,
            ReportVariant::OperationBasis => Grouping::OperationBasis,
        }
    }

    pub fn stock_sources(&self) -> &'static [SourceKind] {
        match self {
            ReportVariant::Standard => &[SourceKind::AgencyStock, SourceKind::DirectStock],
            ReportVariant::OperationBasis => &[SourceKind::AgencyStock],
        }
    }

    /// Folders scanned for periods.
    pub fn discovery_sources(&self) -> &'static [SourceKind] {
        match self {
            ReportVariant::Standard => &SourceKind::ALL,
            ReportVariant::OperationBasis => &[SourceKind::AgencyStock],
        }
    }

    pub fn output_file_name(&self, brand: Brand) -> String {
        match self {
            ReportVariant::Standard => format!("stock_weeks_{}.json", brand.file_stem()),
            ReportVariant::OperationBasis => {
                format!("stock_weeks_{}_operation.json", brand.file_stem())
            }
        }
    }
}

/// Aggregated stock and sales tables of one month.
#[derive(Debug, Clone)]
pub struct MonthTables {
    pub period: Period,
    pub stock: Vec<SourceTable>,
    pub sales: SourceTable,
}

impl MonthTables {
    pub fn is_empty(&self) -> bool {
        self.sales.is_empty() && self.stock.iter().all(SourceTable::is_empty)
    }
}

/// Every month's tables for one variant, loaded once and shared by all brands.
#[derive(Debug, Clone)]
pub struct LoadedSources {
    pub variant: ReportVariant,
    pub months: Vec<MonthTables>,
}

impl LoadedSources {
    /// Reconciled rows of `brand` across all months, in period order.
    pub fn reconcile_brand(&self, brand: Brand) -> Vec<ReconciledRow> {
        self.months
            .iter()
            .flat_map(|month| {
                let stock: Vec<&AggregatedTable> = month.stock.iter().map(|t| &t.amounts).collect();
                reconcile(&stock, &[&month.sales.amounts], Some(brand))
            })
            .collect()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    layout: SourceLayout,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, data_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let layout = SourceLayout::new(data_dir, config.sources.clone());
        Ok(Self { config, layout })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    pub fn auditor(&self) -> OutlierAuditor {
        OutlierAuditor::new(
            self.config.row_outlier_threshold,
            self.config.aggregate_outlier_threshold,
        )
    }

    /// Aggregates one source-month. A read failure is logged and the
    /// source-month counts as empty, so the rest of the run continues.
    pub fn load_source(&self, kind: SourceKind, grouping: Grouping, period: Period) -> SourceTable {
        let path = self.layout.file_for(kind, period);

        let result = SourceAggregator::new(kind, grouping, period, &self.config)
            .and_then(|aggregator| aggregator.aggregate_file(&path));

        match result {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    "{} {}: failed to read {} ({}), treating as no data",
                    period,
                    kind,
                    path.display(),
                    e
                );
                SourceTable::empty(kind, period)
            }
        }
    }

    pub fn load_month(&self, variant: ReportVariant, period: Period) -> MonthTables {
        let grouping = variant.grouping();
        let stock = variant
            .stock_sources()
            .iter()
            .map(|&kind| self.load_source(kind, grouping, period))
            .collect();
        let sales = self.load_source(SourceKind::Sales, grouping, period);

        MonthTables {
            period,
            stock,
            sales,
        }
    }

    /// Discovers periods and loads them in parallel, then audits each table.
    pub fn load(&self, variant: ReportVariant) -> Result<LoadedSources> {
        let periods: Vec<Period> = self
            .layout
            .discover_periods(variant.discovery_sources())?
            .into_iter()
            .collect();

        info!(
            "Loading {} months from {}",
            periods.len(),
            self.layout.data_dir().display()
        );

        let months: Vec<MonthTables> = periods
            .par_iter()
            .map(|&period| self.load_month(variant, period))
            .collect();

        let auditor = self.auditor();
        for month in &months {
            for table in month.stock.iter().chain(std::iter::once(&month.sales)) {
                auditor.audit_and_log(table.kind.label(), &table.amounts);
            }
        }

        Ok(LoadedSources { variant, months })
    }

    fn weeks_calculator(&self) -> WeeksCalculator {
        WeeksCalculator::new(self.config.n_weeks)
    }

    fn operation_calculator(&self) -> OperationCalculator {
        OperationCalculator::new(self.config.weeks_outlier_threshold)
    }

    pub fn assemble_report(&self, sources: &LoadedSources, brand: Brand) -> Option<StockWeeksReport> {
        let rows = sources.reconcile_brand(brand);
        debug!("{}: {} reconciled rows", brand, rows.len());
        ReportAssembler::new(self.weeks_calculator()).assemble(brand, &rows)
    }

    pub fn assemble_operation_report(
        &self,
        sources: &LoadedSources,
        brand: Brand,
    ) -> Option<OperationReport> {
        let rows = sources.reconcile_brand(brand);
        debug!("{}: {} reconciled operation rows", brand, rows.len());
        OperationReportAssembler::new(self.operation_calculator()).assemble(brand, &rows)
    }

    /// Standard report for one brand. The brand name is checked before any I/O.
    pub fn process_brand(&self, brand: &str) -> Result<Option<StockWeeksReport>> {
        let brand: Brand = brand.parse()?;
        let sources = self.load(ReportVariant::Standard)?;
        let report = self.assemble_report(&sources, brand);
        if report.is_none() {
            info!("{}: no data, report skipped", brand);
        }
        Ok(report)
    }

    /// Operation-basis report for one brand. The brand name is checked before any I/O.
    pub fn process_brand_operation(&self, brand: &str) -> Result<Option<OperationReport>> {
        let brand: Brand = brand.parse()?;
        let sources = self.load(ReportVariant::OperationBasis)?;
        let report = self.assemble_operation_report(&sources, brand);
        if report.is_none() {
            info!("{}: no operation-basis data, report skipped", brand);
        }
        Ok(report)
    }

    /// Builds and writes the reports of every configured brand into `out_dir`.
    /// Returns the files written; brands without data are skipped.
    pub fn run(&self, variant: ReportVariant, out_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let sources = self.load(variant)?;
        let mut written = Vec::new();

        for &brand in &self.config.brands {
            let path = out_dir.join(variant.output_file_name(brand));

            let saved = match variant {
                ReportVariant::Standard => self
                    .assemble_report(&sources, brand)
                    .map(|report| report.write_to(&path))
                    .transpose()?,
                ReportVariant::OperationBasis => self
                    .assemble_operation_report(&sources, brand)
                    .map(|report| report.write_to(&path))
                    .transpose()?,
            };

            match saved {
                Some(()) => {
                    info!("{}: wrote {}", brand, path.display());
                    written.push(path);
                }
                None => info!("{}: no data, report skipped", brand),
            }
        }

        Ok(written)
    }
}

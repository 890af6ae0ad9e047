use crate::config::DEFAULT_WEEKS_OUTLIER_THRESHOLD;
use crate::error::Result;
use crate::reconciler::ReconciledRow;
use crate::schema::{Brand, Category, Period};
use crate::utils::round2;
use crate::weeks::{weekly_rate, BaseAmounts};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationMonth {
    pub stock_weeks: Option<f64>,
    pub is_outlier_100wks: bool,
    pub total_stock: f64,
    pub total_sales: f64,
}

impl OperationMonth {
    /// Record for a month with no source row.
    pub fn unobserved() -> Self {
        Self {
            stock_weeks: None,
            is_outlier_100wks: false,
            total_stock: 0.0,
            total_sales: 0.0,
        }
    }
}

/// Stock weeks by operation basis. A month only gets `stock_weeks` when
/// total sales are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationCalculator {
    outlier_threshold: f64,
}

impl Default for OperationCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WEEKS_OUTLIER_THRESHOLD)
    }
}

impl OperationCalculator {
    pub fn new(outlier_threshold: f64) -> Self {
        Self { outlier_threshold }
    }

    pub fn compute(&self, amounts: &BaseAmounts, days_in_month: u32) -> OperationMonth {
        let total_stock = amounts.total_stock();
        let total_sales = amounts.total_sales();

        let stock_weeks = if total_sales > 0.0 && days_in_month > 0 {
            let rate = weekly_rate(total_sales, days_in_month);
            (rate > 0.0)
                .then(|| round2(total_stock / rate))
                .filter(|weeks| weeks.is_finite())
        } else {
            None
        };

        OperationMonth {
            stock_weeks,
            is_outlier_100wks: stock_weeks.is_some_and(|weeks| weeks >= self.outlier_threshold),
            total_stock,
            total_sales,
        }
    }

    pub fn compute_row(&self, row: &ReconciledRow) -> OperationMonth {
        self.compute(&BaseAmounts::from(row), row.period.days_in_month())
    }
}

pub type OperationSeries = BTreeMap<i32, BTreeMap<u32, OperationMonth>>;

/// `category -> operation basis -> year -> month -> record`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub brand: Brand,
    pub categories: BTreeMap<Category, BTreeMap<String, OperationSeries>>,
}

impl Serialize for OperationReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.categories.serialize(serializer)
    }
}

impl OperationReport {
    pub fn flagged_months(&self) -> usize {
        self.categories
            .values()
            .flat_map(|ops| ops.values())
            .flat_map(|series| series.values())
            .flat_map(|grid| grid.values())
            .filter(|month| month.is_outlier_100wks)
            .count()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

pub struct OperationReportAssembler {
    calculator: OperationCalculator,
}

impl OperationReportAssembler {
    pub fn new(calculator: OperationCalculator) -> Self {
        Self { calculator }
    }

    /// Years are those observed for each (category, operation) on its own.
    pub fn assemble(&self, brand: Brand, rows: &[ReconciledRow]) -> Option<OperationReport> {
        if rows.is_empty() {
            return None;
        }

        let mut observed: BTreeMap<(Category, String), BTreeMap<Period, OperationMonth>> =
            BTreeMap::new();
        for row in rows {
            observed
                .entry((row.dimension.category, row.dimension.segment.clone()))
                .or_default()
                .insert(row.period, self.calculator.compute_row(row));
        }

        let mut categories: BTreeMap<Category, BTreeMap<String, OperationSeries>> = BTreeMap::new();

        for ((category, operation), months) in observed {
            let mut series = OperationSeries::new();
            for year in months.keys().map(Period::year) {
                series.entry(year).or_insert_with(|| {
                    Period::months_of_year(year)
                        .map(|period| {
                            let record = months
                                .get(&period)
                                .copied()
                                .unwrap_or_else(OperationMonth::unobserved);
                            (period.month(), record)
                        })
                        .collect()
                });
            }
            categories
                .entry(category)
                .or_default()
                .insert(operation, series);
        }

        let report = OperationReport { brand, categories };
        debug!(
            "{}: operation report with {} categories, {} months at or above {} weeks",
            brand,
            report.categories.len(),
            report.flagged_months(),
            self.calculator.outlier_threshold
        );

        Some(report)
    }
}

use crate::error::Result;
use crate::reconciler::ReconciledRow;
use crate::rollup::rollup_categories;
use crate::schema::{Brand, Category, Period};
use crate::weeks::{StockWeeks, WeeksCalculator};
use log::debug;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Key under which a category's subcategory tree is stored.
pub const SUBCATEGORY_KEY: &str = "소분류";

pub type YearGrid = BTreeMap<u32, StockWeeks>;
pub type YearSeries = BTreeMap<i32, YearGrid>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryReport {
    pub years: YearSeries,
    pub subcategories: BTreeMap<String, YearSeries>,
}

impl Serialize for CategoryReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.years.len() + 1))?;
        for (year, grid) in &self.years {
            map.serialize_entry(&year.to_string(), grid)?;
        }
        map.serialize_entry(SUBCATEGORY_KEY, &self.subcategories)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockWeeksReport {
    pub brand: Brand,
    pub categories: BTreeMap<Category, CategoryReport>,
}

impl Serialize for StockWeeksReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.categories.serialize(serializer)
    }
}

impl StockWeeksReport {
    pub fn years(&self) -> BTreeSet<i32> {
        self.categories
            .values()
            .flat_map(|c| c.years.keys().copied())
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the report, replacing any previous file.
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

/// One complete year: observed months from `lookup`, the rest defaulted.
fn fill_year<F>(year: i32, lookup: F) -> YearGrid
where
    F: Fn(&Period) -> Option<StockWeeks>,
{
    Period::months_of_year(year)
        .map(|period| {
            let record = lookup(&period)
                .unwrap_or_else(|| StockWeeks::unobserved(period.days_in_month()));
            (period.month(), record)
        })
        .collect()
}

/// Builds `category -> year -> month` with the same grid under
/// `"소분류" -> subcategory`. Every observed year gets all twelve months at
/// both levels; months without a source row are [`StockWeeks::unobserved`].
pub struct ReportAssembler {
    calculator: WeeksCalculator,
}

impl ReportAssembler {
    pub fn new(calculator: WeeksCalculator) -> Self {
        Self { calculator }
    }

    /// Builds the brand report from its reconciled leaf rows.
    /// Returns `None` when there are no rows.
    pub fn assemble(&self, brand: Brand, rows: &[ReconciledRow]) -> Option<StockWeeksReport> {
        if rows.is_empty() {
            return None;
        }

        let years: BTreeSet<i32> = rows.iter().map(|r| r.period.year()).collect();

        let mut leaves: BTreeMap<(Category, String), BTreeMap<Period, StockWeeks>> =
            BTreeMap::new();
        for row in rows {
            leaves
                .entry((row.dimension.category, row.dimension.segment.clone()))
                .or_default()
                .insert(row.period, self.calculator.compute_row(row));
        }

        let rolled = rollup_categories(rows, &self.calculator);

        let mut categories: BTreeMap<Category, CategoryReport> = BTreeMap::new();

        for &(category, _) in rolled.keys() {
            categories.entry(category).or_insert_with(|| CategoryReport {
                years: years
                    .iter()
                    .map(|&year| {
                        (
                            year,
                            fill_year(year, |period| rolled.get(&(category, *period)).copied()),
                        )
                    })
                    .collect(),
                subcategories: BTreeMap::new(),
            });
        }

        for ((category, subcategory), observed) in &leaves {
            let series: YearSeries = years
                .iter()
                .map(|&year| (year, fill_year(year, |period| observed.get(period).copied())))
                .collect();

            categories
                .entry(*category)
                .or_default()
                .subcategories
                .insert(subcategory.clone(), series);
        }

        debug!(
            "{}: assembled {} categories, {} subcategories, years {:?}",
            brand,
            categories.len(),
            leaves.len(),
            years
        );

        Some(StockWeeksReport { brand, categories })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DimensionKey;
    use crate::weeks::WeeksValue;

    fn row(category: Category, segment: &str, year: i32, month: u32, amounts: [f64; 4]) -> ReconciledRow {
        ReconciledRow {
            period: Period::new(year, month).unwrap(),
            dimension: DimensionKey::new(Brand::Mlb, category, segment),
            agency_stock: amounts[0],
            direct_stock: amounts[1],
            agency_sales: amounts[2],
            direct_sales: amounts[3],
        }
    }

    fn assembler() -> ReportAssembler {
        ReportAssembler::new(WeeksCalculator::new(25.0))
    }

    #[test]
    fn test_empty_rows_produce_no_report() {
        assert!(assembler().assemble(Brand::Mlb, &[]).is_none());
    }

    #[test]
    fn test_every_observed_year_has_twelve_months_everywhere() {
        let rows = vec![
            row(Category::Shoes, "SH", 2024, 3, [1_000_000.0, 0.0, 140_000.0, 0.0]),
            row(Category::Bag, "BG", 2025, 11, [5.0, 0.0, 0.0, 0.0]),
        ];
        let report = assembler().assemble(Brand::Mlb, &rows).unwrap();

        assert_eq!(report.years(), BTreeSet::from([2024, 2025]));
        for category in report.categories.values() {
            assert_eq!(category.years.len(), 2);
            for grid in category.years.values() {
                assert_eq!(grid.keys().copied().collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
            }
            for series in category.subcategories.values() {
                assert_eq!(series.len(), 2);
                for grid in series.values() {
                    assert_eq!(grid.len(), 12);
                }
            }
        }

        let shoes = &report.categories[&Category::Shoes];
        assert_eq!(shoes.years[&2024][&3].overall, WeeksValue::Numeric(31.63));
        assert_eq!(shoes.years[&2024][&4], StockWeeks::unobserved(30));
        assert_eq!(shoes.years[&2025][&2], StockWeeks::unobserved(28));
        assert_eq!(shoes.subcategories["SH"][&2024][&3].agency, WeeksValue::Numeric(31.63));
    }

    #[test]
    fn test_zero_activity_row_is_kept_as_computed() {
        let rows = vec![row(Category::Headwear, "CP", 2024, 6, [0.0, 0.0, 0.0, 0.0])];
        let report = assembler().assemble(Brand::Mlb, &rows).unwrap();

        let june = report.categories[&Category::Headwear].subcategories["CP"][&2024][&6];
        assert_eq!(june.overall, WeeksValue::NoSales);
        assert_eq!(june.base.total_stock, 0.0);

        let may = report.categories[&Category::Headwear].subcategories["CP"][&2024][&5];
        assert_eq!(may.overall, WeeksValue::Unobserved);
    }

    #[test]
    fn test_json_shape() {
        let rows = vec![
            row(Category::AccEtc, "KY", 2024, 2, [10.0, 0.0, 0.0, 0.0]),
            row(Category::Shoes, "SH", 2024, 3, [1_000_000.0, 0.0, 140_000.0, 0.0]),
        ];
        let report = assembler().assemble(Brand::Mlb, &rows).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(json.get("Acc_etc").is_some());

        let shoes = &json["Shoes"];
        assert_eq!(shoes["2024"]["3"]["전체재고주수"], 31.63);
        assert!(shoes["2024"]["1"]["전체재고주수"].is_null());
        assert_eq!(shoes["2024"]["1"]["기초데이터"]["월일수"], 31);
        assert_eq!(shoes[SUBCATEGORY_KEY]["SH"]["2024"]["3"]["창고재고주수"], 0.0);
        assert_eq!(json["Acc_etc"]["2024"]["2"]["대리상재고주수"], "판매0");
        assert_eq!(json["Acc_etc"]["2024"]["2"]["기초데이터"]["월일수"], 29);
    }

    #[test]
    fn test_months_serialize_in_calendar_order() {
        let rows = vec![row(Category::Bag, "BG", 2024, 10, [1.0, 0.0, 1.0, 0.0])];
        let report = assembler().assemble(Brand::Mlb, &rows).unwrap();
        let text = report.to_json_pretty().unwrap();

        let two = text.find("\"2\": {").unwrap();
        let ten = text.find("\"10\": {").unwrap();
        assert!(two < ten);
    }
}

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::normalizer::{HeaderMap, IndexedRecord, RecordNormalizer};
use crate::schema::{AggregateKey, Grouping, Period, SourceKind};
use csv::StringRecord;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::ops::AddAssign;
use std::path::Path;

/// Rows above the per-row threshold printed per batch before truncating.
const MAX_BATCH_OUTLIERS_LOGGED: usize = 10;

/// Amount units per currency unit. Sums are kept in these integer units.
pub const AMOUNT_SCALE: f64 = 1_000_000.0;

pub type AggregatedTable = BTreeMap<AggregateKey, f64>;

/// Per-key sums in [`AMOUNT_SCALE`] units.
pub type UnitTable = BTreeMap<AggregateKey, i128>;

pub fn to_units(amount: f64) -> i128 {
    (amount * AMOUNT_SCALE).round() as i128
}

pub fn from_units(units: i128) -> f64 {
    units as f64 / AMOUNT_SCALE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_rejected: usize,
    pub amounts_coerced: usize,
    pub batches: usize,
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.rows_read += other.rows_read;
        self.rows_kept += other.rows_kept;
        self.rows_rejected += other.rows_rejected;
        self.amounts_coerced += other.amounts_coerced;
        self.batches += other.batches;
    }
}

/// Running sums of one or more batches. Integer sums make `merge`
/// associative, so batch boundaries never change a total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAggregate {
    pub sums: UnitTable,
    pub stats: LoadStats,
}

impl PartialAggregate {
    pub fn add(&mut self, key: AggregateKey, amount: f64) {
        self.add_units(key, to_units(amount));
    }

    fn add_units(&mut self, key: AggregateKey, units: i128) {
        *self.sums.entry(key).or_insert(0) += units;
    }

    pub fn amount(&self, key: &AggregateKey) -> Option<f64> {
        self.sums.get(key).copied().map(from_units)
    }

    /// Sums as currency amounts, ready for reconciliation.
    pub fn amounts(&self) -> AggregatedTable {
        self.sums
            .iter()
            .map(|(key, units)| (key.clone(), from_units(*units)))
            .collect()
    }

    /// Combines two partial aggregates by summing amounts per key.
    pub fn merge(self, other: PartialAggregate) -> PartialAggregate {
        let (mut larger, smaller) = if self.sums.len() >= other.sums.len() {
            (self, other)
        } else {
            (other, self)
        };

        for (key, units) in smaller.sums {
            larger.add_units(key, units);
        }
        larger.stats += smaller.stats;
        larger
    }
}

/// Aggregated amounts for one `(source kind, period)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub kind: SourceKind,
    pub period: Period,
    pub amounts: AggregatedTable,
    pub stats: LoadStats,
}

impl SourceTable {
    pub fn empty(kind: SourceKind, period: Period) -> Self {
        Self {
            kind,
            period,
            amounts: BTreeMap::new(),
            stats: LoadStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

/// Reads one extract in batches of `batch_size` rows and folds the batch
/// sums into the month table.
pub struct SourceAggregator {
    normalizer: RecordNormalizer,
    period: Period,
    batch_size: usize,
    row_threshold: f64,
}

impl SourceAggregator {
    pub fn new(
        kind: SourceKind,
        grouping: Grouping,
        period: Period,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            normalizer: RecordNormalizer::new(kind, grouping)?,
            period,
            batch_size: config.batch_size.max(1),
            row_threshold: config.row_outlier_threshold,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.normalizer.kind()
    }

    /// Normalizes and sums one batch of raw records.
    pub fn aggregate_batch(&self, headers: &HeaderMap, batch: &[StringRecord]) -> PartialAggregate {
        let mut partial = PartialAggregate::default();
        let mut outliers_logged = 0;

        for record in batch {
            partial.stats.rows_read += 1;

            let row = IndexedRecord { headers, record };
            let Some(canonical) = self.normalizer.normalize(&row) else {
                partial.stats.rows_rejected += 1;
                continue;
            };

            partial.stats.rows_kept += 1;
            if canonical.amount_coerced {
                partial.stats.amounts_coerced += 1;
            }

            if canonical.amount.abs() > self.row_threshold {
                if outliers_logged < MAX_BATCH_OUTLIERS_LOGGED {
                    warn!(
                        "{} {} batch row above {:.0} (kept): {}, channel={}, amount={:.0}",
                        self.period,
                        self.kind(),
                        self.row_threshold,
                        canonical.dimension,
                        canonical.channel,
                        canonical.amount
                    );
                }
                outliers_logged += 1;
            }

            partial.add(
                AggregateKey {
                    period: self.period,
                    dimension: canonical.dimension,
                    channel: canonical.channel,
                },
                canonical.amount,
            );
        }

        partial.stats.batches = 1;
        partial
    }

    pub fn aggregate_reader<R: Read>(&self, reader: R) -> Result<SourceTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = HeaderMap::from_record(csv_reader.headers()?);
        self.normalizer.check_headers(&headers)?;

        let mut total = PartialAggregate::default();
        let mut records = csv_reader.records();

        loop {
            let batch: Vec<StringRecord> = records
                .by_ref()
                .take(self.batch_size)
                .collect::<std::result::Result<_, _>>()?;

            if batch.is_empty() {
                break;
            }

            let partial = self.aggregate_batch(&headers, &batch);
            total = total.merge(partial);
        }

        debug!(
            "{} {}: {} rows read, {} kept, {} rejected, {} amounts coerced to 0 over {} batches",
            self.period,
            self.kind(),
            total.stats.rows_read,
            total.stats.rows_kept,
            total.stats.rows_rejected,
            total.stats.amounts_coerced,
            total.stats.batches
        );

        Ok(SourceTable {
            kind: self.kind(),
            period: self.period,
            amounts: total.amounts(),
            stats: total.stats,
        })
    }

    /// Aggregates the extract at `path`. A missing file is "no data this month".
    pub fn aggregate_file(&self, path: &Path) -> Result<SourceTable> {
        if !path.exists() {
            info!(
                "{} {}: no extract at {}, treating as empty",
                self.period,
                self.kind(),
                path.display()
            );
            return Ok(SourceTable::empty(self.kind(), self.period));
        }

        let file = File::open(path)?;
        self.aggregate_reader(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Brand, Category, Channel, DimensionKey};

    const AGENCY_CSV: &str = "\u{feff}Channel 2,产品品牌,产品大分类,产品中分类,本地小分类,预计库存金额
FRS,MLB,饰品,Shoes,SH,1000
FRS,MLB,饰品,Shoes,SH,2500
FRS,MLB,饰品,Headwear,CP,-300
OR,MLB,饰品,Shoes,SH,999999
FRS,FILA,饰品,Shoes,SH,5
FRS,MLB,服装,Shoes,SH,5
FRS,MLB KIDS,饰品,Bag,BG,not-a-number
FRS,MLB,饰品,Shoes,SH,500
";

    fn aggregator(batch_size: usize) -> SourceAggregator {
        let config = PipelineConfig {
            batch_size,
            ..PipelineConfig::default()
        };
        SourceAggregator::new(
            SourceKind::AgencyStock,
            Grouping::Subcategory,
            Period::new(2024, 3).unwrap(),
            &config,
        )
        .unwrap()
    }

    fn key(brand: Brand, category: Category, segment: &str) -> AggregateKey {
        AggregateKey {
            period: Period::new(2024, 3).unwrap(),
            dimension: DimensionKey::new(brand, category, segment),
            channel: Channel::Agency,
        }
    }

    #[test]
    fn test_aggregate_reader_groups_and_sums() {
        let table = aggregator(100).aggregate_reader(AGENCY_CSV.as_bytes()).unwrap();

        assert_eq!(table.amounts.len(), 3);
        assert_eq!(table.amounts[&key(Brand::Mlb, Category::Shoes, "SH")], 4000.0);
        assert_eq!(table.amounts[&key(Brand::Mlb, Category::Headwear, "CP")], -300.0);
        assert_eq!(table.amounts[&key(Brand::MlbKids, Category::Bag, "BG")], 0.0);

        assert_eq!(table.stats.rows_read, 8);
        assert_eq!(table.stats.rows_kept, 5);
        assert_eq!(table.stats.rows_rejected, 3);
        assert_eq!(table.stats.amounts_coerced, 1);
        assert_eq!(table.stats.batches, 1);
    }

    #[test]
    fn test_batch_size_does_not_change_result() {
        let whole = aggregator(100_000).aggregate_reader(AGENCY_CSV.as_bytes()).unwrap();

        for batch_size in [1, 2, 3, 7] {
            let chunked = aggregator(batch_size)
                .aggregate_reader(AGENCY_CSV.as_bytes())
                .unwrap();
            assert_eq!(chunked.amounts, whole.amounts, "batch size {}", batch_size);
            assert_eq!(chunked.stats.rows_kept, whole.stats.rows_kept);
        }

        let single = aggregator(1).aggregate_reader(AGENCY_CSV.as_bytes()).unwrap();
        assert_eq!(single.stats.batches, 8);
    }

    #[test]
    fn test_fractional_amounts_sum_exactly_at_any_batch_size() {
        let mut csv_data = String::from("Channel 2,产品品牌,产品大分类,产品中分类,本地小分类,预计库存金额\n");
        for amount in ["1234.56", "0.1", "0.2", "7890.12", "0.3", "45.67", "0.7", "99.99"] {
            csv_data.push_str(&format!("FRS,MLB,饰品,Bag,BG,{}\n", amount));
        }

        for batch_size in [1, 2, 3, 4, 100_000] {
            let table = aggregator(batch_size)
                .aggregate_reader(csv_data.as_bytes())
                .unwrap();
            assert_eq!(
                table.amounts[&key(Brand::Mlb, Category::Bag, "BG")],
                9271.64,
                "batch size {}",
                batch_size
            );
        }
    }

    #[test]
    fn test_merge_is_associative_for_fractions() {
        let k = key(Brand::Mlb, Category::Shoes, "SH");
        let part = |amount: f64| {
            let mut partial = PartialAggregate::default();
            partial.add(k.clone(), amount);
            partial
        };

        let left = part(0.1).merge(part(0.2)).merge(part(0.3));
        let right = part(0.1).merge(part(0.2).merge(part(0.3)));
        assert_eq!(left, right);
        assert_eq!(left.amount(&k), Some(0.6));
    }

    #[test]
    fn test_merge_is_commutative() {
        let agg = aggregator(100);
        let headers = HeaderMap::from_record(&StringRecord::from(vec![
            "Channel 2",
            "产品品牌",
            "产品大分类",
            "产品中分类",
            "本地小分类",
            "预计库存金额",
        ]));
        let a = agg.aggregate_batch(
            &headers,
            &[StringRecord::from(vec!["FRS", "MLB", "饰品", "Bag", "BG", "10"])],
        );
        let b = agg.aggregate_batch(
            &headers,
            &[
                StringRecord::from(vec!["FRS", "MLB", "饰品", "Bag", "BG", "5"]),
                StringRecord::from(vec!["FRS", "MLB", "饰品", "Shoes", "SH", "1"]),
            ],
        );

        let ab = a.clone().merge(b.clone());
        let ba = b.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.amount(&key(Brand::Mlb, Category::Bag, "BG")), Some(15.0));
        assert_eq!(ab.stats.batches, 2);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let csv_data = "Channel 2,产品品牌,产品大分类,产品中分类,预计库存金额\nFRS,MLB,饰品,Shoes,1\n";
        let result = aggregator(100).aggregate_reader(csv_data.as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_absent_file_is_empty() {
        let path = std::env::temp_dir().join("stock-weeks-absent-1999.01.csv");
        let table = aggregator(100).aggregate_file(&path).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.stats, LoadStats::default());
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let csv_data = "Channel 2,产品品牌,产品大分类,产品中分类,本地小分类,预计库存金额\n";
        let table = aggregator(100).aggregate_reader(csv_data.as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.stats.batches, 0);
    }
}

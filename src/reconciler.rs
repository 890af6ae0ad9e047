use crate::aggregator::AggregatedTable;
use crate::schema::{Brand, Channel, DimensionKey, Period};
use std::collections::BTreeMap;

/// Reconciliation key: one leaf dimension in one month.
pub type LeafKey = (Period, DimensionKey);

/// Outer join of `N` sparse tables over the union of their keys.
///
/// Every key present in any input appears exactly once in the output; a
/// table that lacks the key contributes 0.0 in its slot.
pub fn outer_join<K: Ord + Clone, const N: usize>(
    tables: [&BTreeMap<K, f64>; N],
) -> BTreeMap<K, [f64; N]> {
    let mut joined: BTreeMap<K, [f64; N]> = BTreeMap::new();

    for (slot, table) in tables.iter().enumerate() {
        for (key, &amount) in table.iter() {
            joined.entry(key.clone()).or_insert([0.0; N])[slot] += amount;
        }
    }

    joined
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    pub period: Period,
    pub dimension: DimensionKey,
    pub agency_stock: f64,
    pub direct_stock: f64,
    pub agency_sales: f64,
    pub direct_sales: f64,
}

#[derive(Debug, Default)]
struct ChannelSplit {
    agency: BTreeMap<LeafKey, f64>,
    direct: BTreeMap<LeafKey, f64>,
}

fn split_by_channel(tables: &[&AggregatedTable], brand: Option<Brand>) -> ChannelSplit {
    let mut split = ChannelSplit::default();

    for table in tables {
        for (key, &amount) in table.iter() {
            if brand.is_some_and(|b| b != key.dimension.brand) {
                continue;
            }

            let target = match key.channel {
                Channel::Agency => &mut split.agency,
                Channel::DirectOperated => &mut split.direct,
            };
            *target
                .entry((key.period, key.dimension.clone()))
                .or_insert(0.0) += amount;
        }
    }

    split
}

/// Reconciles stock and sales tables onto `(period, brand, category, segment)`.
///
/// Stock and sales entries are routed to the agency or direct slot by their
/// channel, so the same function serves the standard pipeline (separate
/// agency and direct stock extracts) and the operation-basis pipeline (one
/// stock extract carrying both channels). `brand` restricts the inputs
/// before the union is taken.
pub fn reconcile(
    stock_tables: &[&AggregatedTable],
    sales_tables: &[&AggregatedTable],
    brand: Option<Brand>,
) -> Vec<ReconciledRow> {
    let stock = split_by_channel(stock_tables, brand);
    let sales = split_by_channel(sales_tables, brand);

    outer_join([&stock.agency, &stock.direct, &sales.agency, &sales.direct])
        .into_iter()
        .map(
            |((period, dimension), [agency_stock, direct_stock, agency_sales, direct_sales])| {
                ReconciledRow {
                    period,
                    dimension,
                    agency_stock,
                    direct_stock,
                    agency_sales,
                    direct_sales,
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AggregateKey, Category};
    use std::collections::BTreeSet;

    fn period() -> Period {
        Period::new(2024, 3).unwrap()
    }

    fn key(brand: Brand, segment: &str, channel: Channel) -> AggregateKey {
        AggregateKey {
            period: period(),
            dimension: DimensionKey::new(brand, Category::Shoes, segment),
            channel,
        }
    }

    #[test]
    fn test_outer_join_union_with_zero_fill() {
        let a: BTreeMap<&str, f64> = [("x", 1.0), ("y", 2.0)].into_iter().collect();
        let b: BTreeMap<&str, f64> = [("y", 3.0), ("z", 4.0)].into_iter().collect();
        let c: BTreeMap<&str, f64> = BTreeMap::new();

        let joined = outer_join([&a, &b, &c]);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined["x"], [1.0, 0.0, 0.0]);
        assert_eq!(joined["y"], [2.0, 3.0, 0.0]);
        assert_eq!(joined["z"], [0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_outer_join_of_empty_tables_is_empty() {
        let empty: BTreeMap<u32, f64> = BTreeMap::new();
        assert!(outer_join([&empty, &empty, &empty, &empty]).is_empty());
    }

    #[test]
    fn test_reconcile_routes_channels_and_keeps_every_key() {
        let mut agency_stock = AggregatedTable::new();
        agency_stock.insert(key(Brand::Mlb, "SH", Channel::Agency), 1_000_000.0);

        let mut direct_stock = AggregatedTable::new();
        direct_stock.insert(key(Brand::Mlb, "SN", Channel::DirectOperated), 500.0);

        let mut sales = AggregatedTable::new();
        sales.insert(key(Brand::Mlb, "SH", Channel::Agency), 140_000.0);
        sales.insert(key(Brand::Mlb, "SD", Channel::DirectOperated), 70.0);

        let rows = reconcile(&[&agency_stock, &direct_stock], &[&sales], None);

        let segments: BTreeSet<&str> = rows.iter().map(|r| r.dimension.segment.as_str()).collect();
        assert_eq!(segments, BTreeSet::from(["SD", "SH", "SN"]));
        assert_eq!(rows.len(), 3);

        let sh = rows.iter().find(|r| r.dimension.segment == "SH").unwrap();
        assert_eq!(sh.agency_stock, 1_000_000.0);
        assert_eq!(sh.direct_stock, 0.0);
        assert_eq!(sh.agency_sales, 140_000.0);
        assert_eq!(sh.direct_sales, 0.0);

        let sd = rows.iter().find(|r| r.dimension.segment == "SD").unwrap();
        assert_eq!(
            (sd.agency_stock, sd.direct_stock, sd.agency_sales, sd.direct_sales),
            (0.0, 0.0, 0.0, 70.0)
        );
    }

    #[test]
    fn test_reconcile_brand_filter() {
        let mut stock = AggregatedTable::new();
        stock.insert(key(Brand::Mlb, "SH", Channel::Agency), 1.0);
        stock.insert(key(Brand::Discovery, "SH", Channel::Agency), 2.0);

        let rows = reconcile(&[&stock], &[], Some(Brand::Discovery));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dimension.brand, Brand::Discovery);
        assert_eq!(rows[0].agency_stock, 2.0);
    }
}

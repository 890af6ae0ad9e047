use crate::reconciler::ReconciledRow;
use crate::schema::{Category, Period};
use crate::weeks::{BaseAmounts, StockWeeks, WeeksCalculator};
use std::collections::BTreeMap;

/// Sums leaf base amounts per (category, period) and recomputes the ratios
/// from those sums. Leaf ratios are never averaged.
pub fn rollup_categories<'a, I>(
    rows: I,
    calculator: &WeeksCalculator,
) -> BTreeMap<(Category, Period), StockWeeks>
where
    I: IntoIterator<Item = &'a ReconciledRow>,
{
    let mut totals: BTreeMap<(Category, Period), BaseAmounts> = BTreeMap::new();

    for row in rows {
        totals
            .entry((row.dimension.category, row.period))
            .or_default()
            .accumulate(&BaseAmounts::from(row));
    }

    totals
        .into_iter()
        .map(|((category, period), amounts)| {
            (
                (category, period),
                calculator.compute(&amounts, period.days_in_month()),
            )
        })
        .collect()
}

use crate::config::DEFAULT_N_WEEKS;
use crate::reconciler::ReconciledRow;
use crate::utils::round2;
use serde::{Serialize, Serializer};

/// Wire literal the report front end uses for "no sales in the month".
pub const NO_SALES_LITERAL: &str = "판매0";

/// One weeks-of-supply figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeeksValue {
    Numeric(f64),
    /// Sales in the denominator were zero, so the ratio is undefined.
    NoSales,
    /// No source row existed for the month.
    Unobserved,
}

impl WeeksValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WeeksValue::Numeric(value) => Some(*value),
            _ => None,
        }
    }
}

impl Serialize for WeeksValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WeeksValue::Numeric(value) => serializer.serialize_f64(*value),
            WeeksValue::NoSales => serializer.serialize_str(NO_SALES_LITERAL),
            WeeksValue::Unobserved => serializer.serialize_none(),
        }
    }
}

/// The four reconciled amounts of one key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseAmounts {
    pub agency_stock: f64,
    pub direct_stock: f64,
    pub agency_sales: f64,
    pub direct_sales: f64,
}

impl BaseAmounts {
    pub fn total_stock(&self) -> f64 {
        self.agency_stock + self.direct_stock
    }

    pub fn total_sales(&self) -> f64 {
        self.agency_sales + self.direct_sales
    }

    pub fn accumulate(&mut self, other: &BaseAmounts) {
        self.agency_stock += other.agency_stock;
        self.direct_stock += other.direct_stock;
        self.agency_sales += other.agency_sales;
        self.direct_sales += other.direct_sales;
    }
}

impl From<&ReconciledRow> for BaseAmounts {
    fn from(row: &ReconciledRow) -> Self {
        Self {
            agency_stock: row.agency_stock,
            direct_stock: row.direct_stock,
            agency_sales: row.agency_sales,
            direct_sales: row.direct_sales,
        }
    }
}

/// Echo of the inputs behind a month's ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaseFigures {
    #[serde(rename = "월일수")]
    pub days_in_month: u32,
    #[serde(rename = "전체재고금액")]
    pub total_stock: f64,
    #[serde(rename = "대리상재고금액")]
    pub agency_stock: f64,
    #[serde(rename = "직영재고금액")]
    pub direct_stock: f64,
    #[serde(rename = "전체판매금액")]
    pub total_sales: f64,
    #[serde(rename = "대리상판매금액")]
    pub agency_sales: f64,
    #[serde(rename = "직영판매금액")]
    pub direct_sales: f64,
}

impl BaseFigures {
    pub fn new(days_in_month: u32, amounts: &BaseAmounts) -> Self {
        Self {
            days_in_month,
            total_stock: amounts.total_stock(),
            agency_stock: amounts.agency_stock,
            direct_stock: amounts.direct_stock,
            total_sales: amounts.total_sales(),
            agency_sales: amounts.agency_sales,
            direct_sales: amounts.direct_sales,
        }
    }

    pub fn zero(days_in_month: u32) -> Self {
        Self::new(days_in_month, &BaseAmounts::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StockWeeks {
    #[serde(rename = "전체재고주수")]
    pub overall: WeeksValue,
    #[serde(rename = "대리상재고주수")]
    pub agency: WeeksValue,
    #[serde(rename = "창고재고주수")]
    pub warehouse: WeeksValue,
    #[serde(rename = "기초데이터")]
    pub base: BaseFigures,
}

impl StockWeeks {
    /// Default record for a month with no source row at all.
    pub fn unobserved(days_in_month: u32) -> Self {
        Self {
            overall: WeeksValue::Unobserved,
            agency: WeeksValue::Unobserved,
            warehouse: WeeksValue::Unobserved,
            base: BaseFigures::zero(days_in_month),
        }
    }
}

/// Weekly sales rate for a month's sales.
pub fn weekly_rate(sales: f64, days_in_month: u32) -> f64 {
    (sales / days_in_month as f64) * 7.0
}

/// `stock / weekly_rate(sales)` rounded to two decimals, or `NoSales`.
/// A ratio that overflows is `NoSales` too, so `Numeric` is always finite.
pub fn weeks_of_supply(stock: f64, sales: f64, days_in_month: u32) -> WeeksValue {
    if sales == 0.0 || sales.is_nan() || days_in_month == 0 {
        return WeeksValue::NoSales;
    }

    let rate = weekly_rate(sales, days_in_month);
    if rate == 0.0 {
        return WeeksValue::NoSales;
    }

    let weeks = round2(stock / rate);
    if weeks.is_finite() {
        WeeksValue::Numeric(weeks)
    } else {
        WeeksValue::NoSales
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeksCalculator {
    n_weeks: f64,
}

impl Default for WeeksCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_N_WEEKS)
    }
}

impl WeeksCalculator {
    pub fn new(n_weeks: f64) -> Self {
        Self { n_weeks }
    }

    pub fn n_weeks(&self) -> f64 {
        self.n_weeks
    }

    /// Direct stock left after reserving `n_weeks` of planned direct sales.
    /// May be negative.
    pub fn warehouse_stock(&self, amounts: &BaseAmounts, days_in_month: u32) -> f64 {
        let direct_rate = if amounts.direct_sales == 0.0
            || amounts.direct_sales.is_nan()
            || days_in_month == 0
        {
            0.0
        } else {
            weekly_rate(amounts.direct_sales, days_in_month)
        };

        amounts.direct_stock - direct_rate * self.n_weeks
    }

    pub fn compute(&self, amounts: &BaseAmounts, days_in_month: u32) -> StockWeeks {
        let total_sales = amounts.total_sales();

        let overall = weeks_of_supply(amounts.total_stock(), total_sales, days_in_month);
        let agency = weeks_of_supply(amounts.agency_stock, amounts.agency_sales, days_in_month);
        let warehouse = weeks_of_supply(
            self.warehouse_stock(amounts, days_in_month),
            total_sales,
            days_in_month,
        );

        StockWeeks {
            overall,
            agency,
            warehouse,
            base: BaseFigures::new(days_in_month, amounts),
        }
    }

    pub fn compute_row(&self, row: &ReconciledRow) -> StockWeeks {
        self.compute(&BaseAmounts::from(row), row.period.days_in_month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agency_only_scenario() {
        let calc = WeeksCalculator::new(25.0);
        let amounts = BaseAmounts {
            agency_stock: 1_000_000.0,
            direct_stock: 0.0,
            agency_sales: 140_000.0,
            direct_sales: 0.0,
        };

        let result = calc.compute(&amounts, 31);
        assert_eq!(result.overall, WeeksValue::Numeric(31.63));
        assert_eq!(result.agency, WeeksValue::Numeric(31.63));
        assert_eq!(result.warehouse, WeeksValue::Numeric(0.0));
        assert_eq!(result.base.total_stock, 1_000_000.0);
        assert_eq!(result.base.total_sales, 140_000.0);
        assert_eq!(result.base.days_in_month, 31);
    }

    #[test]
    fn test_zero_sales_is_sentinel_not_number() {
        let calc = WeeksCalculator::default();
        let amounts = BaseAmounts {
            agency_stock: 500_000.0,
            ..BaseAmounts::default()
        };

        let result = calc.compute(&amounts, 30);
        assert_eq!(result.overall, WeeksValue::NoSales);
        assert_eq!(result.agency, WeeksValue::NoSales);
        assert_eq!(result.warehouse, WeeksValue::NoSales);
        assert_eq!(result.base.agency_stock, 500_000.0);
        assert_eq!(result.base.total_stock, 500_000.0);
    }

    #[test]
    fn test_offsetting_sales_are_no_sales() {
        let calc = WeeksCalculator::default();
        let amounts = BaseAmounts {
            agency_stock: 100.0,
            direct_stock: 100.0,
            agency_sales: 50.0,
            direct_sales: -50.0,
        };

        let result = calc.compute(&amounts, 31);
        assert_eq!(result.overall, WeeksValue::NoSales);
        assert_eq!(result.warehouse, WeeksValue::NoSales);
        assert!(matches!(result.agency, WeeksValue::Numeric(_)));
    }

    #[test]
    fn test_overflowing_ratio_is_no_sales() {
        let calc = WeeksCalculator::default();
        let amounts = BaseAmounts {
            agency_stock: 1e10,
            agency_sales: 1e-300,
            ..BaseAmounts::default()
        };

        let result = calc.compute(&amounts, 31);
        assert_eq!(result.overall, WeeksValue::NoSales);
        assert_eq!(result.agency, WeeksValue::NoSales);
        assert_eq!(result.warehouse, WeeksValue::Numeric(0.0));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["전체재고주수"], "판매0");
        assert_eq!(json["대리상재고주수"], "판매0");

        assert_eq!(weeks_of_supply(f64::MAX, 1e-10, 30), WeeksValue::NoSales);
    }

    #[test]
    fn test_agency_ratio_is_independent_of_totals() {
        let calc = WeeksCalculator::default();
        let amounts = BaseAmounts {
            agency_stock: 0.0,
            direct_stock: 70_000.0,
            agency_sales: 0.0,
            direct_sales: 7_000.0,
        };

        let result = calc.compute(&amounts, 28);
        assert_eq!(result.agency, WeeksValue::NoSales);
        // weekly rate 1750, 70000 / 1750 = 40
        assert_eq!(result.overall, WeeksValue::Numeric(40.0));
        // warehouse stock 70000 - 1750 * 25 = 26250 -> 15 weeks
        assert_eq!(result.warehouse, WeeksValue::Numeric(15.0));
    }

    #[test]
    fn test_warehouse_stock_can_go_negative() {
        let calc = WeeksCalculator::new(25.0);
        let amounts = BaseAmounts {
            agency_stock: 0.0,
            direct_stock: 1_000.0,
            agency_sales: 3_000.0,
            direct_sales: 3_000.0,
        };

        // direct rate 700/week -> reserve 17500
        assert_eq!(calc.warehouse_stock(&amounts, 30), 1_000.0 - 17_500.0);
        let result = calc.compute(&amounts, 30);
        // overall rate 1400/week -> -16500 / 1400
        assert_eq!(result.warehouse, WeeksValue::Numeric(-11.79));
    }

    #[test]
    fn test_n_weeks_changes_only_warehouse() {
        let amounts = BaseAmounts {
            agency_stock: 10_000.0,
            direct_stock: 20_000.0,
            agency_sales: 3_100.0,
            direct_sales: 3_100.0,
        };
        let short = WeeksCalculator::new(1.0).compute(&amounts, 31);
        let long = WeeksCalculator::new(25.0).compute(&amounts, 31);

        assert_eq!(short.overall, long.overall);
        assert_eq!(short.agency, long.agency);
        assert_ne!(short.warehouse, long.warehouse);
    }

    #[test]
    fn test_serialization_of_values() {
        assert_eq!(serde_json::to_string(&WeeksValue::Numeric(31.63)).unwrap(), "31.63");
        assert_eq!(serde_json::to_string(&WeeksValue::NoSales).unwrap(), "\"판매0\"");
        assert_eq!(serde_json::to_string(&WeeksValue::Unobserved).unwrap(), "null");
    }

    #[test]
    fn test_unobserved_record_shape() {
        let record = StockWeeks::unobserved(29);
        let json = serde_json::to_value(record).unwrap();
        assert!(json["전체재고주수"].is_null());
        assert!(json["대리상재고주수"].is_null());
        assert!(json["창고재고주수"].is_null());
        assert_eq!(json["기초데이터"]["월일수"], 29);
        assert_eq!(json["기초데이터"]["직영판매금액"], 0.0);
    }
}

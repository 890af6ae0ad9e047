use crate::aggregator::AggregatedTable;
use crate::schema::{AggregateKey, Brand, Category, Channel, Period};
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FindingScope {
    /// One aggregated key.
    Row,
    /// A (period, brand, category, channel) total across leaf segments.
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierFinding {
    pub scope: FindingScope,
    pub source: String,
    pub context: String,
    pub amount: f64,
    pub threshold: f64,
}

impl fmt::Display for OutlierFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            FindingScope::Row => "row",
            FindingScope::Aggregate => "aggregate",
        };
        write!(
            f,
            "[{}] {} outlier (kept): {}: amount={:.0} exceeds {:.0}",
            self.source, scope, self.context, self.amount, self.threshold
        )
    }
}

/// Reports suspicious amounts. Never alters the audited table.
#[derive(Debug, Clone, Copy)]
pub struct OutlierAuditor {
    pub row_threshold: f64,
    pub aggregate_threshold: f64,
}

impl OutlierAuditor {
    pub fn new(row_threshold: f64, aggregate_threshold: f64) -> Self {
        Self {
            row_threshold,
            aggregate_threshold,
        }
    }

    pub fn audit(&self, source: &str, table: &AggregatedTable) -> Vec<OutlierFinding> {
        let mut findings = Vec::new();

        for (key, &amount) in table {
            if amount.abs() > self.row_threshold {
                findings.push(OutlierFinding {
                    scope: FindingScope::Row,
                    source: source.to_string(),
                    context: key.to_string(),
                    amount,
                    threshold: self.row_threshold,
                });
            }
        }

        for ((period, brand, category, channel), amount) in group_totals(table) {
            if amount.abs() > self.aggregate_threshold {
                findings.push(OutlierFinding {
                    scope: FindingScope::Aggregate,
                    source: source.to_string(),
                    context: format!(
                        "period={}, channel={}, brand={}, category={}",
                        period, channel, brand, category
                    ),
                    amount,
                    threshold: self.aggregate_threshold,
                });
            }
        }

        findings
    }

    /// Audits and logs every finding at `warn`.
    pub fn audit_and_log(&self, source: &str, table: &AggregatedTable) -> Vec<OutlierFinding> {
        let findings = self.audit(source, table);
        for finding in &findings {
            warn!("{}", finding);
        }
        findings
    }
}

fn group_totals(table: &AggregatedTable) -> BTreeMap<(Period, Brand, Category, Channel), f64> {
    let mut totals = BTreeMap::new();
    for (key, amount) in table {
        let AggregateKey {
            period,
            dimension,
            channel,
        } = key;
        *totals
            .entry((*period, dimension.brand, dimension.category, *channel))
            .or_insert(0.0) += amount;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DimensionKey;

    fn key(segment: &str, channel: Channel) -> AggregateKey {
        AggregateKey {
            period: Period::new(2024, 5).unwrap(),
            dimension: DimensionKey::new(Brand::Mlb, Category::Headwear, segment),
            channel,
        }
    }

    #[test]
    fn test_row_and_aggregate_findings() {
        let mut table = AggregatedTable::new();
        table.insert(key("CP", Channel::Agency), 300.0);
        table.insert(key("BN", Channel::Agency), -250.0);
        table.insert(key("CP", Channel::DirectOperated), 50.0);

        let auditor = OutlierAuditor::new(200.0, 500.0);
        let findings = auditor.audit("sales", &table);

        let rows: Vec<_> = findings
            .iter()
            .filter(|f| f.scope == FindingScope::Row)
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|f| f.amount == -250.0));

        // Agency group nets to 50, direct to 50: no aggregate finding
        assert!(findings.iter().all(|f| f.scope == FindingScope::Row));

        let strict = OutlierAuditor::new(1e10, 40.0);
        let aggregate = strict.audit("sales", &table);
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.iter().all(|f| f.scope == FindingScope::Aggregate));
    }

    #[test]
    fn test_audit_does_not_mutate_and_is_idempotent() {
        let mut table = AggregatedTable::new();
        table.insert(key("CP", Channel::Agency), 2e10);
        let before = table.clone();

        let auditor = OutlierAuditor::new(1e10, 5e11);
        let first = auditor.audit_and_log("agency stock", &table);
        let second = auditor.audit_and_log("agency stock", &table);

        assert_eq!(first, second);
        assert_eq!(table, before);
        assert_eq!(first.len(), 1);
        assert!(first[0].to_string().contains("segment=CP"));
    }

    #[test]
    fn test_empty_table_has_no_findings() {
        let auditor = OutlierAuditor::new(1.0, 1.0);
        assert!(auditor.audit("direct stock", &AggregatedTable::new()).is_empty());
    }
}

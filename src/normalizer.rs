use crate::error::{InventoryWeeksError, Result};
use crate::schema::{
    Brand, Category, Channel, DimensionKey, Grouping, SourceKind, ACCESSORY_MARKER,
    DIRECT_ACCESSORY_PREFIX, HIERARCHY_CATEGORY_LEN, HIERARCHY_CATEGORY_OFFSET,
    NO_OPERATION_BASIS, STYLE_SUBCATEGORY_LEN, STYLE_SUBCATEGORY_OFFSET,
};
use crate::utils::char_slice;
use csv::StringRecord;
use std::collections::HashMap;

pub const COL_CHANNEL: &str = "Channel 2";
pub const COL_BRAND: &str = "产品品牌";
pub const COL_TOP_CATEGORY: &str = "产品大分类";
pub const COL_MID_CATEGORY: &str = "产品中分类";
pub const COL_SUBCATEGORY: &str = "本地小分类";
pub const COL_OPERATION_BASIS: &str = "运营基准";
pub const COL_AGENCY_STOCK_AMOUNT: &str = "预计库存金额";
pub const COL_SALES_AMOUNT: &str = "吊牌金额";

pub const COL_DIRECT_BRAND: &str = "브랜드명";
pub const COL_DIRECT_HIERARCHY: &str = "제품계층구조";
pub const COL_DIRECT_STYLE: &str = "스타일 코드";
pub const COL_DIRECT_AMOUNT: &str = "TAG-기말재고";

/// Read access to one raw row by column name.
pub trait RawRow {
    fn field(&self, column: &str) -> Option<&str>;
}

impl RawRow for HashMap<&str, &str> {
    fn field(&self, column: &str) -> Option<&str> {
        self.get(column).copied()
    }
}

/// Column name -> position, built once per file from the header record.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    positions: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn from_record(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), idx))
            .collect();
        Self { positions }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

/// A CSV record viewed through its file's header map.
pub struct IndexedRecord<'a> {
    pub headers: &'a HeaderMap,
    pub record: &'a StringRecord,
}

impl RawRow for IndexedRecord<'_> {
    fn field(&self, column: &str) -> Option<&str> {
        self.headers
            .position(column)
            .and_then(|idx| self.record.get(idx))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub dimension: DimensionKey,
    pub channel: Channel,
    pub amount: f64,
    /// The raw amount was missing or unparseable and was replaced by 0.0.
    pub amount_coerced: bool,
}

/// Maps one raw row onto a [`CanonicalRecord`]. Agency stock and sales
/// share the distributor layout; direct stock encodes category and
/// subcategory inside its hierarchy and style codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordNormalizer {
    kind: SourceKind,
    grouping: Grouping,
}

impl RecordNormalizer {
    pub fn new(kind: SourceKind, grouping: Grouping) -> Result<Self> {
        if kind == SourceKind::DirectStock && grouping == Grouping::OperationBasis {
            return Err(InventoryWeeksError::InvalidConfig(
                "direct stock extracts carry no operation basis".to_string(),
            ));
        }
        Ok(Self { kind, grouping })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    pub fn required_columns(&self) -> Vec<&'static str> {
        match self.kind {
            SourceKind::DirectStock => vec![
                COL_DIRECT_BRAND,
                COL_DIRECT_HIERARCHY,
                COL_DIRECT_STYLE,
                COL_DIRECT_AMOUNT,
            ],
            SourceKind::AgencyStock | SourceKind::Sales => vec![
                COL_CHANNEL,
                COL_BRAND,
                COL_TOP_CATEGORY,
                COL_MID_CATEGORY,
                self.leaf_column(),
                self.amount_column(),
            ],
        }
    }

    pub fn check_headers(&self, headers: &HeaderMap) -> Result<()> {
        for column in self.required_columns() {
            if !headers.contains(column) {
                return Err(InventoryWeeksError::MissingColumn {
                    source_kind: self.kind.label().to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn leaf_column(&self) -> &'static str {
        match (self.kind, self.grouping) {
            (SourceKind::DirectStock, _) => COL_DIRECT_STYLE,
            (_, Grouping::Subcategory) => COL_SUBCATEGORY,
            (_, Grouping::OperationBasis) => COL_OPERATION_BASIS,
        }
    }

    fn amount_column(&self) -> &'static str {
        match self.kind {
            SourceKind::AgencyStock => COL_AGENCY_STOCK_AMOUNT,
            SourceKind::DirectStock => COL_DIRECT_AMOUNT,
            SourceKind::Sales => COL_SALES_AMOUNT,
        }
    }

    fn allows_channel(&self, channel: Channel) -> bool {
        match (self.kind, self.grouping) {
            (SourceKind::AgencyStock, Grouping::Subcategory) => channel == Channel::Agency,
            _ => true,
        }
    }

    /// Returns `None` when the row is filtered out.
    pub fn normalize<R: RawRow + ?Sized>(&self, row: &R) -> Option<CanonicalRecord> {
        let (dimension, channel) = match self.kind {
            SourceKind::DirectStock => self.direct_dimension(row)?,
            SourceKind::AgencyStock | SourceKind::Sales => self.distributor_dimension(row)?,
        };

        let (amount, amount_coerced) = match parse_amount(row.field(self.amount_column())) {
            Some(value) => (value, false),
            None => (0.0, true),
        };

        Some(CanonicalRecord {
            dimension,
            channel,
            amount,
            amount_coerced,
        })
    }

    fn distributor_dimension<R: RawRow + ?Sized>(&self, row: &R) -> Option<(DimensionKey, Channel)> {
        let channel = Channel::from_code(present(row.field(COL_CHANNEL))?)?;
        if !self.allows_channel(channel) {
            return None;
        }

        let brand: Brand = present(row.field(COL_BRAND))?.parse().ok()?;

        if present(row.field(COL_TOP_CATEGORY))? != ACCESSORY_MARKER {
            return None;
        }

        let category = Category::parse(present(row.field(COL_MID_CATEGORY))?)?;

        let segment = match self.grouping {
            Grouping::Subcategory => present(row.field(COL_SUBCATEGORY))?.to_string(),
            Grouping::OperationBasis => normalize_operation_basis(row.field(COL_OPERATION_BASIS)),
        };

        Some((DimensionKey::new(brand, category, segment), channel))
    }

    fn direct_dimension<R: RawRow + ?Sized>(&self, row: &R) -> Option<(DimensionKey, Channel)> {
        let brand: Brand = present(row.field(COL_DIRECT_BRAND))?.parse().ok()?;

        let hierarchy = present(row.field(COL_DIRECT_HIERARCHY))?;
        if char_slice(hierarchy, 0, DIRECT_ACCESSORY_PREFIX.chars().count()) != DIRECT_ACCESSORY_PREFIX
        {
            return None;
        }
        let category = Category::from_hierarchy_code(&char_slice(
            hierarchy,
            HIERARCHY_CATEGORY_OFFSET,
            HIERARCHY_CATEGORY_LEN,
        ))?;

        let style = present(row.field(COL_DIRECT_STYLE))?;
        let subcategory = char_slice(style, STYLE_SUBCATEGORY_OFFSET, STYLE_SUBCATEGORY_LEN);
        if subcategory.is_empty() {
            return None;
        }

        Some((
            DimensionKey::new(brand, category, subcategory),
            Channel::DirectOperated,
        ))
    }
}

/// Trimmed, non-empty field value.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses a raw amount. Missing, unparseable and non-finite values yield `None`.
pub fn parse_amount(raw: Option<&str>) -> Option<f64> {
    present(raw)?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Collapses missing, blank and "nan" operation bases into [`NO_OPERATION_BASIS`].
pub fn normalize_operation_basis(raw: Option<&str>) -> String {
    match present(raw) {
        Some(value) if value != "nan" => value.to_string(),
        _ => NO_OPERATION_BASIS.to_string(),
    }
}

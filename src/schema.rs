use crate::error::{InventoryWeeksError, Result};
use crate::utils::{days_in_month, last_day_of_month, validate_month};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level category marker for accessories in the agency and sales extracts.
pub const ACCESSORY_MARKER: &str = "饰品";

/// Hierarchy prefix for accessories in the direct-operated stock extract.
pub const DIRECT_ACCESSORY_PREFIX: &str = "A0100";

/// Character window of the category code inside the direct-stock hierarchy code.
pub const HIERARCHY_CATEGORY_OFFSET: usize = 5;
pub const HIERARCHY_CATEGORY_LEN: usize = 5;

/// Character window of the subcategory inside the direct-stock style code.
pub const STYLE_SUBCATEGORY_OFFSET: usize = 6;
pub const STYLE_SUBCATEGORY_LEN: usize = 2;

/// Label shared by every row whose operation basis is missing, blank or "nan".
pub const NO_OPERATION_BASIS: &str = "运营基准없음";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Brand {
    #[serde(rename = "MLB")]
    #[schemars(description = "MLB (adult line)")]
    Mlb,

    #[serde(rename = "MLB KIDS")]
    #[schemars(description = "MLB KIDS (children's line)")]
    MlbKids,

    #[serde(rename = "DISCOVERY")]
    #[schemars(description = "DISCOVERY")]
    Discovery,
}

impl Brand {
    pub const ALL: [Brand; 3] = [Brand::Mlb, Brand::MlbKids, Brand::Discovery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Mlb => "MLB",
            Brand::MlbKids => "MLB KIDS",
            Brand::Discovery => "DISCOVERY",
        }
    }

    /// Name used in output file names ("MLB KIDS" -> "MLB_KIDS").
    pub fn file_stem(&self) -> String {
        self.as_str().replace(' ', "_")
    }
}

impl FromStr for Brand {
    type Err = InventoryWeeksError;

    fn from_str(s: &str) -> Result<Self> {
        Brand::ALL
            .into_iter()
            .find(|brand| brand.as_str() == s)
            .ok_or_else(|| InventoryWeeksError::InvalidBrand(s.to_string()))
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mid-level accessory category. Declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Shoes,
    Headwear,
    Bag,
    #[serde(rename = "Acc_etc")]
    AccEtc,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Shoes,
        Category::Headwear,
        Category::Bag,
        Category::AccEtc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Shoes => "Shoes",
            Category::Headwear => "Headwear",
            Category::Bag => "Bag",
            Category::AccEtc => "Acc_etc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_str() == raw)
    }

    /// Fixed direct-stock hierarchy table (5-character segment -> category).
    pub fn from_hierarchy_code(code: &str) -> Option<Self> {
        match code {
            "A0120" => Some(Category::AccEtc),
            "A0130" => Some(Category::Bag),
            "A0140" => Some(Category::Headwear),
            "A0150" => Some(Category::Shoes),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Third-party distributor points of sale ("FRS").
    Agency,
    /// Company-operated points of sale ("OR").
    DirectOperated,
}

impl Channel {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "FRS" => Some(Channel::Agency),
            "OR" => Some(Channel::DirectOperated),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Channel::Agency => "FRS",
            Channel::DirectOperated => "OR",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    AgencyStock,
    DirectStock,
    Sales,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::AgencyStock,
        SourceKind::DirectStock,
        SourceKind::Sales,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::AgencyStock => "agency stock",
            SourceKind::DirectStock => "direct stock",
            SourceKind::Sales => "sales",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the finest key segment below category carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Subcategory,
    OperationBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Rejects months outside 1..=12 and years whose December the
    /// calendar cannot represent, so every month of the year has a length.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        validate_month(month)?;
        if last_day_of_month(year, 12).is_none() {
            return Err(InventoryWeeksError::InvalidPeriod(format!(
                "{year:04}.{month:02}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days_in_month(&self) -> u32 {
        // year and month are validated on construction
        days_in_month(self.year, self.month).unwrap_or(30)
    }

    /// January through December of `year`.
    pub fn months_of_year(year: i32) -> impl Iterator<Item = Period> {
        (1..=12).map(move |month| Period { year, month })
    }

    /// File stem of the monthly extract for this period ("2024.03").
    pub fn file_stem(&self) -> String {
        format!("{:04}.{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// (brand, category, segment). The segment is a subcategory code, or an
/// operation-basis label under [`Grouping::OperationBasis`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
    pub brand: Brand,
    pub category: Category,
    pub segment: String,
}

impl DimensionKey {
    pub fn new(brand: Brand, category: Category, segment: impl Into<String>) -> Self {
        Self {
            brand,
            category,
            segment: segment.into(),
        }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "brand={}, category={}, segment={}",
            self.brand, self.category, self.segment
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub period: Period,
    pub dimension: DimensionKey,
    pub channel: Channel,
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "period={}, channel={}, {}",
            self.period, self.channel, self.dimension
        )
    }
}

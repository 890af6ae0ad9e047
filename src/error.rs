use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryWeeksError {
    #[error("Invalid brand '{0}': must be one of MLB, MLB KIDS, DISCOVERY")]
    InvalidBrand(String),

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid period '{0}': expected YYYY.MM")]
    InvalidPeriod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source '{source_kind}' is missing required column '{column}'")]
    MissingColumn { source_kind: String, column: String },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InventoryWeeksError>;

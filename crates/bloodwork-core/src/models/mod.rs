//! Data models: engine configuration and extraction results.

pub mod config;
pub mod record;

pub use config::{BloodworkConfig, ExtractionConfig, InputConfig, OutputConfig, RulesConfig};
pub use record::{
    AbnormalFlag, Diagnostics, ExtractedRecord, ExtractionResult, ExtractionStatus, MarkerValue,
    Qualifier, Rejection, StrategyKind, StructuredReport, StructuredRow, Table, TestDate,
};

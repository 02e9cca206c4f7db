pub mod config;
pub mod convert;
pub mod error;
pub mod grid;
pub mod logger;
pub mod metadata;
pub mod partition;
pub mod paths;
pub mod runner;
pub mod season;
pub mod source;
pub mod status;
pub mod store;
pub mod variables;

// Re-export commonly used types for tests
pub use config::Config;
pub use convert::{Converter, PartitionReport, PartitionStatus, StoreState, probe};
pub use error::{ConvertError, SourceError};
pub use grid::{DayGrid, Field};
pub use partition::PartitionKey;
pub use season::Season;
pub use source::DaySource;
pub use store::ZarrStore;
pub use variables::{FixedVariables, VariablePolicy};

pub mod assistant;
pub mod batch;
pub mod cleanup;
pub mod config;
pub mod consistency;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod history;
pub mod ir;
pub mod locale;
pub mod normalize;
pub mod progress;
pub mod qa;
pub mod sentinels;
pub mod settings;
pub mod store;
pub mod terminology;
pub mod textutil;

pub use corpus::CorpusService;
pub use error::{WorkbenchError, WorkbenchResult};
pub use ir::{QaIssue, TranslationSegment, TranslationUnit};
pub use settings::QaSettings;

pub mod types;
pub mod config;
pub mod store;
pub mod postgres;
pub mod generation;
pub mod research;
pub mod draft;
pub mod humanize;
pub mod seo;
pub mod media;
pub mod sections;
pub mod orchestrator;
pub mod publisher;
pub mod interlink;
pub mod linkhealth;

pub use types::*;
pub use config::EngineConfig;
pub use store::{ArticleLocks, ContentStore, MemoryStore};
pub use postgres::PgStore;
pub use orchestrator::PipelineOrchestrator;
pub use publisher::{PublishOutcome, PublishRequest, Publisher};
pub use interlink::{InterlinkEngine, ScanReport, ScanScope};
pub use linkhealth::LinkHealthScorer;

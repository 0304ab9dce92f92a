pub mod ingestion_service;
pub mod llm_service;
pub mod query_service;
pub mod table_registry;
pub mod table_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use ingestion_service::*;
pub use llm_service::*;
pub use query_service::*;
pub use table_registry::*;
pub use table_service::*;

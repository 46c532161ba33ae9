pub mod ingestion;
pub mod results;
pub mod upload;

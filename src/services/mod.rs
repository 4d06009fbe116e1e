pub mod directory;
pub mod eta;
pub mod ingest;
pub mod locations;

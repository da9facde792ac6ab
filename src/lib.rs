pub mod config;
pub mod engine;
pub mod pipeline;
pub mod scrape;
pub mod storage;
pub mod table;
pub mod training;

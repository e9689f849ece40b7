pub mod config;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod regression;
pub mod series;
pub mod sources;
pub mod summary;
pub mod transform;

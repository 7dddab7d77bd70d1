pub mod aggregator;
pub mod cli;
pub mod consumption;
pub mod error;
pub mod join;
pub mod normalizer;
pub mod nutrition;
pub mod output;
pub mod pipeline;
pub mod table;

pub mod badges;
pub mod filter;
pub mod graph;
pub mod preferences;
pub mod service;
pub mod stats;
pub mod transcript;
pub mod types;

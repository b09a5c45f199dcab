pub mod api;
pub mod app_state;
pub mod cache;
pub mod chain;
pub mod greeks;
pub mod indicators;
pub mod pipeline;
pub mod runtime_config;
pub mod screener;
pub mod selector;
pub mod signals;
pub mod sources;
pub mod stream;
pub mod symbology;
pub mod types;

pub mod aggregator_service;
pub mod index_service;
pub mod monitor_service;
pub mod risk_service;
pub mod scanner_service;

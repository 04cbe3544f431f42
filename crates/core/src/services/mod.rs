pub mod aggregator;
pub mod fx_service;
pub mod portfolio_service;
pub mod refresh_service;
pub mod scheduler;
pub mod valuation_service;

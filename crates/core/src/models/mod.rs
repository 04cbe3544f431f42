pub mod coin;
pub mod fx;
pub mod holding;
pub mod portfolio;
pub mod price;
pub mod settings;
pub mod valuation;

pub mod http;
pub mod registry;
pub mod traits;

// Price sources
pub mod coincap;
pub mod coingecko;

// FX providers
pub mod exchangerate_host;
pub mod frankfurter;
pub mod open_er_api;

// ═══════════════════════════════════════════════════════════════════
// Provider Tests: CoinCatalog, ProviderRegistry, provider error mapping
// ═══════════════════════════════════════════════════════════════════

use std::sync::Arc;
use std::time::Duration;

use coinbox_core::errors::CoreError;
use coinbox_core::models::coin::{CoinCatalog, CoinMeta, COINCAP, COINGECKO};
use coinbox_core::providers::coincap::CoinCapPriceSource;
use coinbox_core::providers::coingecko::{CoinGeckoPriceSource, CoinGeckoTetherFxProvider};
use coinbox_core::providers::http::HttpConfig;
use coinbox_core::providers::open_er_api::OpenErApiFxProvider;
use coinbox_core::providers::registry::ProviderRegistry;
use coinbox_core::providers::traits::{FxProvider, PriceSource};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Nothing listens on the discard port, so every request fails fast.
const DEAD_HOST: &str = "http://127.0.0.1:9";

fn fast_http() -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_secs(2),
        ..HttpConfig::default()
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinCatalog
// ═══════════════════════════════════════════════════════════════════

mod catalog {
    use super::*;

    #[test]
    fn default_catalog_covers_the_watchlist() {
        let catalog = CoinCatalog::default();
        assert_eq!(
            catalog.symbols(),
            ["BTC", "ETH", "SOL", "LINK", "USDT", "SUI", "TRX", "DOT", "ARB"]
        );
        assert_eq!(catalog.provider_id("btc", COINGECKO), Some("bitcoin"));
        assert_eq!(catalog.provider_id("TRX", COINCAP), Some("tron"));
        assert_eq!(catalog.name_of("DOT"), Some("Polkadot"));
    }

    #[test]
    fn unknown_symbol_has_no_ids() {
        let catalog = CoinCatalog::default();
        assert!(catalog.get("DOGE").is_none());
        assert!(catalog.provider_id("DOGE", COINGECKO).is_none());
    }

    #[test]
    fn reverse_lookup() {
        let catalog = CoinCatalog::default();
        assert_eq!(catalog.symbol_for(COINGECKO, "chainlink"), Some("LINK"));
        assert_eq!(catalog.symbol_for(COINGECKO, "dogecoin"), None);
    }

    #[test]
    fn insert_replaces_existing_symbol() {
        let mut catalog = CoinCatalog::empty();
        assert!(catalog.is_empty());
        catalog.insert(CoinMeta::new("DOGE", "Dogecoin").with_id(COINGECKO, "dogecoin"));
        catalog.insert(CoinMeta::new("doge", "Doge").with_id(COINCAP, "dogecoin"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.name_of("DOGE"), Some("Doge"));
        assert!(catalog.provider_id("DOGE", COINGECKO).is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// ProviderRegistry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    fn defaults(reference: &str) -> ProviderRegistry {
        ProviderRegistry::new_with_defaults(
            Arc::new(CoinCatalog::default()),
            reference,
            &HttpConfig::default(),
        )
    }

    #[test]
    fn default_providers_in_priority_order() {
        let registry = defaults("USD");
        assert_eq!(registry.price_source_ids(), ["coingecko", "coincap"]);
        assert_eq!(
            registry.fx_provider_ids(),
            ["open_er_api", "exchangerate_host", "coingecko_tether", "frankfurter"]
        );
    }

    #[test]
    fn coincap_only_for_usd_reference() {
        let registry = defaults("EUR");
        assert_eq!(registry.price_source_ids(), ["coingecko"]);
    }

    #[test]
    fn order_puts_listed_first_then_the_rest() {
        let registry = defaults("USD");
        let ordered: Vec<String> = registry
            .ordered_fx_providers(&ids(&["coingecko_tether", "open_er_api"]))
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(
            ordered,
            ["coingecko_tether", "open_er_api", "exchangerate_host", "frankfurter"]
        );
    }

    #[test]
    fn unknown_and_repeated_ids_are_ignored() {
        let registry = defaults("USD");
        let ordered: Vec<String> = registry
            .ordered_price_sources(&ids(&["nope", "coincap", "coincap"]))
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ordered, ["coincap", "coingecko"]);
    }

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.price_sources().is_empty());
        assert!(registry.fx_providers().is_empty());
        assert!(registry.ordered_fx_providers(&ids(&["open_er_api"])).is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Error mapping (no successful network calls)
// ═══════════════════════════════════════════════════════════════════

mod error_mapping {
    use super::*;

    #[tokio::test]
    async fn unmapped_symbol_is_unsupported_before_any_request() {
        // The dead host would produce a network error if a request were made.
        let source = CoinGeckoPriceSource::new(Arc::new(CoinCatalog::default()), "USD", &fast_http())
            .with_base_url(DEAD_HOST);
        assert!(!source.supports("DOGE"));
        let err = source.fetch_quote("DOGE").await.unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSymbol(ref s) if s == "DOGE"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn coingecko_resolves_ids_through_catalog() {
        let source = CoinGeckoPriceSource::new(Arc::new(CoinCatalog::default()), "USD", &fast_http());
        assert_eq!(source.resolve_id("sol"), Some("solana"));
        assert!(source.supports("ARB"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let source = CoinCapPriceSource::new(Arc::new(CoinCatalog::default()), &fast_http())
            .with_base_url(DEAD_HOST);
        let err = source.fetch_quote("BTC").await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)), "{err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn silent_server_times_out_as_network_error() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let http = HttpConfig {
            timeout: Duration::from_millis(200),
            ..HttpConfig::default()
        };
        let source = CoinCapPriceSource::new(Arc::new(CoinCatalog::default()), &http)
            .with_base_url(format!("http://{addr}"));

        let started = std::time::Instant::now();
        let err = source.fetch_quote("BTC").await.unwrap_err();
        assert!(matches!(err, CoreError::Network(ref msg) if msg.contains("timed out")), "{err:?}");
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn fx_provider_unreachable_is_a_network_error() {
        let provider = OpenErApiFxProvider::new(&fast_http()).with_base_url(DEAD_HOST);
        let err = provider.fetch_rate("USD", "RUB").await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)), "{err:?}");
    }

    #[tokio::test]
    async fn tether_proxy_requires_usd_base() {
        let provider = CoinGeckoTetherFxProvider::new(&fast_http()).with_base_url(DEAD_HOST);
        let err = provider.fetch_rate("EUR", "RUB").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::NoRateAvailable { ref base, ref target } if base == "EUR" && target == "RUB"
        ));
    }
}

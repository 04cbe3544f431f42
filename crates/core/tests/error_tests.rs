// ═══════════════════════════════════════════════════════════════════
// Error Tests: CoreError variants, Display formatting, From impls
// ═══════════════════════════════════════════════════════════════════

use coinbox_core::errors::CoreError;
use coinbox_core::models::holding::HoldingField;
use coinbox_core::models::settings::normalize_currency;

// ── Display formatting ──────────────────────────────────────────────

mod display {
    use super::*;

    #[test]
    fn validation_names_the_field() {
        let err = CoreError::validation(HoldingField::ManualUnitPrice, "must be >= 0");
        assert_eq!(err.to_string(), "Invalid manual unit price: must be >= 0");

        let err = CoreError::validation(HoldingField::Amount, "must be > 0");
        assert_eq!(err.to_string(), "Invalid amount: must be > 0");
    }

    #[test]
    fn no_rate_available() {
        let err = CoreError::NoRateAvailable {
            base: "USD".into(),
            target: "RUB".into(),
        };
        assert_eq!(err.to_string(), "No exchange rate available for USD → RUB");
    }

    #[test]
    fn malformed_response() {
        let err = CoreError::malformed("CoinCap", "missing priceUsd");
        assert_eq!(err.to_string(), "Malformed response (CoinCap): missing priceUsd");
    }

    #[test]
    fn simple_variants() {
        assert_eq!(
            CoreError::UnsupportedSymbol("DOGE".into()).to_string(),
            "Unsupported symbol: DOGE"
        );
        assert_eq!(
            CoreError::NotFound("abc".into()).to_string(),
            "Holding not found: abc"
        );
        assert_eq!(
            CoreError::Network("timeout".into()).to_string(),
            "Network error: timeout"
        );
        assert_eq!(
            CoreError::InvalidSetting("x".into()).to_string(),
            "Invalid setting: x"
        );
    }
}

// ── Retry classification ────────────────────────────────────────────

mod transient {
    use super::*;

    #[test]
    fn network_and_provider_faults_are_transient() {
        assert!(CoreError::Network("reset".into()).is_transient());
        assert!(CoreError::malformed("p", "m").is_transient());
        assert!(CoreError::NoRateAvailable {
            base: "USD".into(),
            target: "RUB".into()
        }
        .is_transient());
    }

    #[test]
    fn user_and_mapping_errors_are_permanent() {
        assert!(!CoreError::UnsupportedSymbol("DOGE".into()).is_transient());
        assert!(!CoreError::validation(HoldingField::Symbol, "empty").is_transient());
        assert!(!CoreError::NotFound("id".into()).is_transient());
        assert!(!CoreError::InvalidSetting("x".into()).is_transient());
    }
}

// ── From impls ──────────────────────────────────────────────────────

mod conversions {
    use super::*;

    #[test]
    fn from_io_error_is_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::Storage(ref m) if m.contains("denied")));
    }

    #[test]
    fn from_serde_json_error_is_deserialization() {
        let parse = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: CoreError = parse.into();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[tokio::test]
    async fn from_reqwest_error_is_network_with_query_redacted() {
        let client = reqwest::Client::new();
        let e = client
            .get("http://127.0.0.1:9/latest?base=USD&symbols=RUB")
            .send()
            .await
            .unwrap_err();
        let err: CoreError = e.into();
        match err {
            CoreError::Network(msg) => assert!(!msg.contains("symbols=RUB"), "{msg}"),
            other => panic!("expected network error, got {other:?}"),
        }
    }
}

// ── Settings validation ─────────────────────────────────────────────

mod currency_codes {
    use super::*;

    #[test]
    fn valid_codes_are_uppercased() {
        assert_eq!(normalize_currency("rub").unwrap(), "RUB");
        assert_eq!(normalize_currency(" eur ").unwrap(), "EUR");
    }

    #[test]
    fn invalid_codes_are_rejected() {
        for bad in ["", "RU", "RUBL", "R1B", "€UR"] {
            assert!(
                matches!(normalize_currency(bad), Err(CoreError::InvalidSetting(_))),
                "{bad:?}"
            );
        }
    }
}

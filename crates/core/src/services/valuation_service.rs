use std::sync::Mutex;

use crate::models::coin::CoinCatalog;
use crate::models::fx::FxRate;
use crate::models::holding::Holding;
use crate::models::price::{ChangePeriod, MarketRow, PriceMap};
use crate::models::valuation::{LineValuation, PortfolioValuation, PriceOrigin};

/// Turns (holdings, quotes, FX rate) into local-currency values.
///
/// No I/O and no state: the same inputs always produce
/// the same valuation, and no NaN or infinity ever reaches a line or the
/// total: anything non-finite falls back to the manual price, then to 0.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Live unit price in local currency, if a usable quote and rate exist.
    pub fn live_unit_price(
        &self,
        symbol: &str,
        quotes: &PriceMap,
        fx: Option<&FxRate>,
    ) -> Option<f64> {
        let quote = quotes.get(symbol).filter(|q| q.is_valid())?;
        let fx = fx.filter(|f| f.is_valid())?;
        let unit = quote.unit_price_base * fx.rate;
        unit.is_finite().then_some(unit)
    }

    /// Value one holding.
    pub fn value_holding(
        &self,
        holding: &Holding,
        quotes: &PriceMap,
        fx: Option<&FxRate>,
    ) -> LineValuation {
        let amount = if holding.amount.is_finite() { holding.amount } else { 0.0 };
        let manual = if holding.manual_unit_price.is_finite() && holding.manual_unit_price >= 0.0 {
            holding.manual_unit_price
        } else {
            0.0
        };

        let (unit, origin) = match self.live_unit_price(&holding.symbol, quotes, fx) {
            Some(unit) if (unit * amount).is_finite() => (unit, PriceOrigin::Live),
            _ => (manual, PriceOrigin::Manual),
        };

        let line_value = unit * amount;
        let (unit, line_value) = if line_value.is_finite() {
            (unit, line_value)
        } else {
            (0.0, 0.0)
        };

        LineValuation {
            holding_id: holding.id,
            symbol: holding.symbol.clone(),
            amount,
            unit_price_local: unit,
            line_value,
            price_origin: origin,
        }
    }

    /// Value every holding and sum the lines in portfolio order.
    pub fn value_portfolio(
        &self,
        holdings: &[Holding],
        quotes: &PriceMap,
        fx: Option<&FxRate>,
    ) -> PortfolioValuation {
        let lines: Vec<LineValuation> = holdings
            .iter()
            .map(|h| self.value_holding(h, quotes, fx))
            .collect();

        let total = lines.iter().fold(0.0_f64, |acc, l| acc + l.line_value);
        // Finite lines can still overflow when summed; saturate instead of emitting inf.
        let total = if total.is_finite() { total } else { f64::MAX };

        let quotes_as_of = lines
            .iter()
            .filter(|l| l.price_origin == PriceOrigin::Live)
            .filter_map(|l| quotes.get(&l.symbol).map(|q| q.as_of))
            .max();

        let fx_used = fx.filter(|f| f.is_valid()).cloned();

        PortfolioValuation {
            lines,
            total,
            fx: fx_used,
            quotes_as_of,
        }
    }

    /// Market overview rows for `symbols`, in the given order.
    pub fn market_rows(
        &self,
        symbols: &[String],
        catalog: &CoinCatalog,
        quotes: &PriceMap,
        fx: Option<&FxRate>,
        period: ChangePeriod,
    ) -> Vec<MarketRow> {
        symbols
            .iter()
            .map(|symbol| {
                let quote = quotes.get(symbol).filter(|q| q.is_valid());
                MarketRow {
                    symbol: symbol.clone(),
                    name: catalog.name_of(symbol).unwrap_or(symbol.as_str()).to_string(),
                    price_base: quote.map(|q| q.unit_price_base),
                    price_local: self.live_unit_price(symbol, quotes, fx),
                    change_pct: quote.and_then(|q| q.changes.for_period(period)),
                }
            })
            .collect()
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Revisions of the three valuation inputs. Any change invalidates the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValuationKey {
    pub portfolio: u64,
    pub quotes: u64,
    pub fx: u64,
}

/// Memoizes the last valuation on its full input key.
#[derive(Debug, Default)]
pub struct ValuationCache {
    last: Mutex<Option<(ValuationKey, PortfolioValuation)>>,
}

impl ValuationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached valuation for `key`, computing and storing it on a miss.
    pub fn get_or_compute(
        &self,
        key: ValuationKey,
        compute: impl FnOnce() -> PortfolioValuation,
    ) -> PortfolioValuation {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_key, valuation)) = last.as_ref() {
            if *cached_key == key {
                return valuation.clone();
            }
        }
        let valuation = compute();
        *last = Some((key, valuation.clone()));
        valuation
    }

    pub fn invalidate(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

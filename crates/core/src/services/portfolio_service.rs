use log::{debug, info};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::holding::{normalize_symbol, Holding, HoldingField, HoldingUpdate};
use crate::models::portfolio::PortfolioSnapshot;
use crate::models::settings::DuplicatePolicy;
use crate::storage::manager::StorageManager;
use crate::storage::traits::PORTFOLIO_KEY;

/// Proof that the user confirmed a destructive clear.
///
/// Only constructible through `ClearConfirmation::confirmed()`, so wiping
/// the portfolio always takes an explicit step by the caller.
#[derive(Debug)]
pub struct ClearConfirmation(());

impl ClearConfirmation {
    /// Call this only after the user has accepted the confirmation prompt.
    pub fn confirmed() -> Self {
        Self(())
    }
}

/// Owns the holdings list and writes it through to storage.
///
/// Every mutation re-serializes the whole list. Persistence is best-effort:
/// a failed write is logged and the in-memory change stands.
pub struct PortfolioStore {
    snapshot: PortfolioSnapshot,
    storage: StorageManager,
    duplicate_policy: DuplicatePolicy,
    revision: u64,
}

impl std::fmt::Debug for PortfolioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioStore")
            .field("holdings", &self.snapshot.len())
            .field("duplicate_policy", &self.duplicate_policy)
            .field("revision", &self.revision)
            .finish()
    }
}

impl PortfolioStore {
    /// Empty store; nothing is read from storage.
    pub fn new(storage: StorageManager) -> Self {
        Self {
            snapshot: PortfolioSnapshot::default(),
            storage,
            duplicate_policy: DuplicatePolicy::Append,
            revision: 0,
        }
    }

    /// Load the persisted snapshot. Missing or corrupt data yields an empty list.
    pub async fn load(storage: StorageManager) -> Self {
        let snapshot: PortfolioSnapshot = storage.load_json(PORTFOLIO_KEY).await.unwrap_or_default();
        info!("Loaded portfolio with {} holdings", snapshot.len());
        Self {
            snapshot,
            storage,
            duplicate_policy: DuplicatePolicy::Append,
            revision: 0,
        }
    }

    pub fn set_duplicate_policy(&mut self, policy: DuplicatePolicy) {
        self.duplicate_policy = policy;
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Add a holding. Returns the id of the new holding, or of the holding
    /// the amount was merged into under `DuplicatePolicy::Merge`.
    pub async fn add(
        &mut self,
        symbol: &str,
        amount: f64,
        manual_unit_price: f64,
    ) -> Result<Uuid, CoreError> {
        let symbol = normalize_symbol(symbol);
        validate_symbol(&symbol)?;
        validate_amount(amount)?;
        validate_manual_price(manual_unit_price)?;

        let id = match self.merge_target(&symbol) {
            Some(existing) => {
                let merged = existing.amount + amount;
                validate_amount(merged)?;
                existing.amount = merged;
                debug!("Merged {amount} {symbol} into holding {}", existing.id);
                existing.id
            }
            None => {
                let holding = Holding::new(symbol, amount, manual_unit_price);
                let id = holding.id;
                self.snapshot.holdings.push(holding);
                id
            }
        };

        self.commit().await;
        Ok(id)
    }

    /// Remove a holding. Unknown ids are a no-op; returns whether anything was removed.
    pub async fn remove(&mut self, id: Uuid) -> bool {
        let before = self.snapshot.len();
        self.snapshot.holdings.retain(|h| h.id != id);
        let removed = self.snapshot.len() != before;
        if removed {
            self.commit().await;
        } else {
            debug!("Remove of unknown holding {id} ignored");
        }
        removed
    }

    /// Update amount and/or manual price of an existing holding in place.
    pub async fn edit(&mut self, id: Uuid, update: HoldingUpdate) -> Result<(), CoreError> {
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }
        if let Some(price) = update.manual_unit_price {
            validate_manual_price(price)?;
        }

        let holding = self
            .snapshot
            .holdings
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        if let Some(amount) = update.amount {
            holding.amount = amount;
        }
        if let Some(price) = update.manual_unit_price {
            holding.manual_unit_price = price;
        }

        self.commit().await;
        Ok(())
    }

    /// Empty the list. Destructive; requires an explicit confirmation token.
    pub async fn clear(&mut self, _confirmation: ClearConfirmation) {
        info!("Clearing {} holdings", self.snapshot.len());
        self.snapshot.holdings.clear();
        self.commit().await;
    }

    /// Holdings in display (insertion) order.
    pub fn holdings(&self) -> &[Holding] {
        &self.snapshot.holdings
    }

    pub fn get(&self, id: Uuid) -> Option<&Holding> {
        self.snapshot.holdings.iter().find(|h| h.id == id)
    }

    pub fn snapshot(&self) -> &PortfolioSnapshot {
        &self.snapshot
    }

    /// Distinct symbols currently held.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.snapshot.symbols()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Bumped on every mutation; used as a valuation cache key.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn merge_target(&mut self, symbol: &str) -> Option<&mut Holding> {
        match self.duplicate_policy {
            DuplicatePolicy::Append => None,
            DuplicatePolicy::Merge => self.snapshot.holdings.iter_mut().find(|h| h.symbol == symbol),
        }
    }

    async fn commit(&mut self) {
        self.revision += 1;
        self.storage.save_json(PORTFOLIO_KEY, &self.snapshot).await;
    }
}

fn validate_symbol(symbol: &str) -> Result<(), CoreError> {
    if symbol.is_empty() {
        return Err(CoreError::validation(HoldingField::Symbol, "symbol must not be empty"));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<(), CoreError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CoreError::validation(
            HoldingField::Amount,
            format!("amount must be a positive number, got {amount}"),
        ));
    }
    Ok(())
}

fn validate_manual_price(price: f64) -> Result<(), CoreError> {
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::validation(
            HoldingField::ManualUnitPrice,
            format!("manual unit price must be zero or positive, got {price}"),
        ));
    }
    Ok(())
}

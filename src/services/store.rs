//! Persistence for SOP listings, payment transactions and purchases.

use crate::models::payment::{PaymentTransaction, Purchase, SopListing, TransactionStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Store error: {0}")]
    Internal(String),
}

/// Fields written when a transaction's checkout status changes.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub payment_status: Option<String>,
    pub payment_id: Option<String>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_sop(&self, sop_id: &str) -> Result<Option<SopListing>, StoreError>;

    async fn create_transaction(&self, transaction: PaymentTransaction) -> Result<(), StoreError>;

    async fn find_transaction(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError>;

    async fn update_transaction(
        &self,
        session_id: &str,
        update: TransactionUpdate,
    ) -> Result<(), StoreError>;

    async fn find_purchase(
        &self,
        sop_id: &str,
        session_id: &str,
    ) -> Result<Option<Purchase>, StoreError>;

    async fn create_purchase(&self, purchase: Purchase) -> Result<(), StoreError>;
}

/// In-process store; contents live as long as the gateway process.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    sops: RwLock<HashMap<String, SopListing>>,
    transactions: RwLock<HashMap<String, PaymentTransaction>>,
    purchases: RwLock<Vec<Purchase>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(listings: impl IntoIterator<Item = SopListing>) -> Self {
        let store = Self::new();
        if let Ok(mut sops) = store.sops.write() {
            sops.extend(listings.into_iter().map(|sop| (sop.id.clone(), sop)));
        }
        store
    }

    /// Loads a JSON array of listings from `path`.
    pub fn from_catalog_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let listings: Vec<SopListing> = serde_json::from_str(&raw)?;
        Ok(Self::with_catalog(listings))
    }

    pub fn insert_sop(&self, listing: SopListing) -> Result<(), StoreError> {
        let mut sops = self
            .sops
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        sops.insert(listing.id.clone(), listing);
        Ok(())
    }

    pub fn purchase_count(&self) -> usize {
        self.purchases.read().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_sop(&self, sop_id: &str) -> Result<Option<SopListing>, StoreError> {
        let sops = self
            .sops
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(sops.get(sop_id).cloned())
    }

    async fn create_transaction(&self, transaction: PaymentTransaction) -> Result<(), StoreError> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if transactions.contains_key(&transaction.session_id) {
            return Err(StoreError::Duplicate(transaction.session_id));
        }
        transactions.insert(transaction.session_id.clone(), transaction);
        Ok(())
    }

    async fn find_transaction(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        let transactions = self
            .transactions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(transactions.get(session_id).cloned())
    }

    async fn update_transaction(
        &self,
        session_id: &str,
        update: TransactionUpdate,
    ) -> Result<(), StoreError> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let transaction = transactions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        transaction.status = update.status;
        transaction.payment_status = update.payment_status;
        if update.payment_id.is_some() {
            transaction.payment_id = update.payment_id;
        }
        Ok(())
    }

    async fn find_purchase(
        &self,
        sop_id: &str,
        session_id: &str,
    ) -> Result<Option<Purchase>, StoreError> {
        let purchases = self
            .purchases
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(purchases
            .iter()
            .find(|p| p.sop_id == sop_id && p.stripe_payment_id == session_id)
            .cloned())
    }

    async fn create_purchase(&self, purchase: Purchase) -> Result<(), StoreError> {
        let mut purchases = self
            .purchases
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        purchases.push(purchase);
        Ok(())
    }
}

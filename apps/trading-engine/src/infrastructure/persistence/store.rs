//! Transactional table store with optional JSON snapshot durability.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use tokio::sync::Mutex;

use super::error::StoreError;
use super::tables::{Row, Tables, WriteSet};
use crate::config::PersistenceConfig;
use crate::domain::shared::{ContractId, OrderId, OtcTradeId, TransactionId};

/// Id sequences, seeded from the highest key present at load.
#[derive(Debug)]
struct Sequences {
    orders: AtomicU64,
    transactions: AtomicU64,
    otc_trades: AtomicU64,
    contracts: AtomicU64,
}

impl Sequences {
    fn after(tables: &Tables) -> Self {
        fn next<K: Copy + Into<u64>, R>(table: &BTreeMap<K, R>) -> AtomicU64 {
            AtomicU64::new(table.keys().next_back().map_or(1, |k| (*k).into() + 1))
        }
        Self {
            orders: next(&tables.orders),
            transactions: next(&tables.transactions),
            otc_trades: next(&tables.otc_trades),
            contracts: next(&tables.contracts),
        }
    }
}

/// The store shared by every component.
///
/// Committed tables sit behind a std `RwLock` that is only held for the
/// duration of a synchronous read or swap. Commits are serialized by an async
/// writer mutex, which is also held while a snapshot is written.
#[derive(Debug)]
pub struct Store {
    tables: RwLock<Tables>,
    writer: Mutex<()>,
    snapshot_path: Option<PathBuf>,
    sequences: Sequences,
}

impl Store {
    /// A volatile store with no tables.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_tables(Tables::default())
    }

    /// A volatile store seeded with `tables`.
    #[must_use]
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            sequences: Sequences::after(&tables),
            tables: RwLock::new(tables),
            writer: Mutex::new(()),
            snapshot_path: None,
        }
    }

    /// A volatile store seeded from a JSON document of [`Tables`].
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(Self::from_tables(serde_json::from_str(json)?))
    }

    /// Open the store described by `config`.
    ///
    /// With persistence enabled the snapshot is loaded when present and
    /// rewritten on every commit.
    pub async fn open(config: &PersistenceConfig) -> Result<Self, StoreError> {
        let Some(path) = config.snapshot_path.as_ref().filter(|_| config.enabled) else {
            tracing::info!("Persistence disabled, using volatile store");
            return Ok(Self::in_memory());
        };

        let tables = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            orders = tables.orders.len(),
            sagas = tables.sagas.len(),
            "Store loaded"
        );

        let mut store = Self::from_tables(tables);
        store.snapshot_path = Some(path.clone());
        Ok(store)
    }

    /// Start a transaction. Dropping it without commit discards its writes.
    #[must_use]
    pub fn begin(&self) -> StoreTx<'_> {
        StoreTx {
            store: self,
            writes: WriteSet::default(),
        }
    }

    /// Copy of every committed table.
    #[must_use]
    pub fn snapshot(&self) -> Tables {
        self.read().clone()
    }

    /// Allocate a fresh order id.
    pub fn next_order_id(&self) -> OrderId {
        OrderId::new(self.sequences.orders.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a fresh transaction id.
    pub fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.sequences.transactions.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a fresh OTC trade id.
    pub fn next_otc_trade_id(&self) -> OtcTradeId {
        OtcTradeId::new(self.sequences.otc_trades.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a fresh contract id.
    pub fn next_contract_id(&self) -> ContractId {
        ContractId::new(self.sequences.contracts.fetch_add(1, Ordering::SeqCst))
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let _writer = self.writer.lock().await;

        match &self.snapshot_path {
            Some(path) => {
                let mut next = self.read().clone();
                writes.apply(&mut next);
                write_snapshot(path, &next).await?;
                *self.tables.write().unwrap_or_else(PoisonError::into_inner) = next;
            }
            None => {
                let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
                writes.apply(&mut tables);
            }
        }
        Ok(())
    }
}

async fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(tables)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// An open storage transaction.
///
/// Reads see committed rows overlaid with this transaction's own staged
/// writes. Nothing is visible to other readers until [`StoreTx::commit`].
#[derive(Debug)]
pub struct StoreTx<'a> {
    store: &'a Store,
    writes: WriteSet,
}

impl StoreTx<'_> {
    /// Row with `key`, if present.
    #[must_use]
    pub fn get<R: Row>(&self, key: &R::Key) -> Option<R> {
        if let Some(staged) = R::staged(&self.writes).get(key) {
            return staged.clone();
        }
        R::table(&self.store.read()).get(key).cloned()
    }

    /// Row with `key`, or `NotFound`.
    pub fn require<R: Row>(&self, key: &R::Key) -> Result<R, StoreError> {
        self.get(key).ok_or_else(|| StoreError::NotFound {
            entity: R::ENTITY,
            id: key.to_string(),
        })
    }

    /// Every row matching `filter`, in key order.
    #[must_use]
    pub fn scan<R: Row>(&self, filter: impl Fn(&R) -> bool) -> Vec<R> {
        let mut rows: BTreeMap<R::Key, R> = R::table(&self.store.read())
            .iter()
            .filter(|(_, row)| filter(row))
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect();
        for (key, staged) in R::staged(&self.writes) {
            match staged {
                Some(row) if filter(row) => {
                    rows.insert(key.clone(), row.clone());
                }
                _ => {
                    rows.remove(key);
                }
            }
        }
        rows.into_values().collect()
    }

    /// Stage an insert or update.
    pub fn put<R: Row>(&mut self, row: R) {
        R::staged_mut(&mut self.writes).insert(row.key(), Some(row));
    }

    /// Stage a delete.
    pub fn delete<R: Row>(&mut self, key: &R::Key) {
        R::staged_mut(&mut self.writes).insert(key.clone(), None);
    }

    /// Apply every staged write atomically.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.store.commit(self.writes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Security;
    use crate::domain::portfolio::{Position, PositionKey};
    use crate::domain::shared::{Money, SecurityId, UserId};

    fn security(id: u64) -> Security {
        Security {
            id: SecurityId::new(id),
            ticker: format!("T{id}"),
            last_price: Money::from_cents(1_000),
            volume: 0,
            settlement_date: None,
        }
    }

    fn key() -> PositionKey {
        PositionKey {
            user_id: UserId::new(1),
            security_id: SecurityId::new(1),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_private() {
        let store = Store::in_memory();
        let mut tx = store.begin();
        tx.put(security(1));

        assert!(tx.get::<Security>(&SecurityId::new(1)).is_some());
        assert!(store.begin().get::<Security>(&SecurityId::new(1)).is_none());

        tx.commit().await.unwrap();
        assert!(store.begin().get::<Security>(&SecurityId::new(1)).is_some());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = Store::in_memory();
        {
            let mut tx = store.begin();
            tx.put(security(1));
        }
        assert!(store.snapshot().securities.is_empty());
    }

    #[tokio::test]
    async fn scan_overlays_staged_deletes_and_updates() {
        let store = Store::in_memory();
        let mut seed = store.begin();
        seed.put(security(1));
        seed.put(security(2));
        seed.commit().await.unwrap();

        let mut tx = store.begin();
        tx.delete::<Security>(&SecurityId::new(1));
        let mut changed = security(2);
        changed.volume = 9;
        tx.put(changed);
        tx.put(security(3));

        let rows = tx.scan::<Security>(|_| true);
        let ids: Vec<u64> = rows.iter().map(|s| s.id.value()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(rows[0].volume, 9);
    }

    #[tokio::test]
    async fn require_reports_entity_and_key() {
        let store = Store::in_memory();
        let err = store.begin().require::<Position>(&key()).unwrap_err();
        assert_eq!(err.to_string(), "position not found: user 1 / security 1");
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            enabled: true,
            snapshot_path: Some(dir.path().join("store.json")),
        };

        let store = Store::open(&config).await.unwrap();
        let mut tx = store.begin();
        tx.put(Position::open(UserId::new(1), SecurityId::new(1), 4, Money::from_cents(500)));
        tx.commit().await.unwrap();
        drop(store);

        let reopened = Store::open(&config).await.unwrap();
        let position = reopened.begin().require::<Position>(&key()).unwrap();
        assert_eq!(position.quantity, 4);
    }

    #[tokio::test]
    async fn sequences_continue_after_seeded_rows() {
        let json = r#"{"securities":[{"id":1,"ticker":"X","last_price":"10","settlement_date":null}]}"#;
        let store = Store::from_json(json).unwrap();
        assert_eq!(store.next_order_id().value(), 1);
        assert_eq!(store.next_order_id().value(), 2);
        assert_eq!(store.snapshot().securities.len(), 1);
    }
}

//! Table layout of the store and the staged write set.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::market::{Listing, Security};
use crate::domain::order_execution::{Order, Transaction};
use crate::domain::otc::{OptionContract, OtcTrade, SagaState};
use crate::domain::portfolio::{Actuary, Position, PositionKey};
use crate::domain::shared::{ContractId, OrderId, OtcTradeId, SagaUid, SecurityId, TransactionId, UserId};

/// A record stored in one of the tables, addressed by its key.
pub trait Row: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key.
    type Key: Ord + Clone + fmt::Display + Send + Sync;

    /// Entity name used in errors.
    const ENTITY: &'static str;

    /// Primary key of this row.
    fn key(&self) -> Self::Key;

    /// Committed table holding rows of this type.
    fn table(tables: &Tables) -> &BTreeMap<Self::Key, Self>;

    /// Mutable committed table.
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self>;

    /// Staged writes for this table. `None` marks a delete.
    fn staged(writes: &WriteSet) -> &BTreeMap<Self::Key, Option<Self>>;

    /// Mutable staged writes.
    fn staged_mut(writes: &mut WriteSet) -> &mut BTreeMap<Self::Key, Option<Self>>;
}

macro_rules! tables {
    ($($field:ident: $row:ty => $key:ty, $entity:literal, |$r:ident| $key_expr:expr;)*) => {
        /// Every committed row, one map per table.
        ///
        /// Serialized as arrays of rows so composite keys survive JSON.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct Tables {
            $(
                #[doc = concat!("Rows of the `", stringify!($field), "` table.")]
                #[serde(with = "rows")]
                pub $field: BTreeMap<$key, $row>,
            )*
        }

        /// Writes buffered by an open transaction.
        #[derive(Debug, Default)]
        pub struct WriteSet {
            $($field: BTreeMap<$key, Option<$row>>,)*
        }

        impl WriteSet {
            /// Whether nothing has been staged.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_empty())*
            }

            /// Apply every staged write to `tables`.
            pub fn apply(self, tables: &mut Tables) {
                $(merge(&mut tables.$field, self.$field);)*
            }
        }

        $(
            impl Row for $row {
                type Key = $key;
                const ENTITY: &'static str = $entity;

                fn key(&self) -> $key {
                    let $r = self;
                    $key_expr
                }

                fn table(tables: &Tables) -> &BTreeMap<$key, Self> {
                    &tables.$field
                }

                fn table_mut(tables: &mut Tables) -> &mut BTreeMap<$key, Self> {
                    &mut tables.$field
                }

                fn staged(writes: &WriteSet) -> &BTreeMap<$key, Option<Self>> {
                    &writes.$field
                }

                fn staged_mut(writes: &mut WriteSet) -> &mut BTreeMap<$key, Option<Self>> {
                    &mut writes.$field
                }
            }
        )*
    };
}

tables! {
    orders: Order => OrderId, "order", |r| r.id();
    transactions: Transaction => TransactionId, "transaction", |r| r.id;
    positions: Position => PositionKey, "position", |r| r.key();
    actuaries: Actuary => UserId, "actuary", |r| r.user_id;
    securities: Security => SecurityId, "security", |r| r.id;
    listings: Listing => String, "listing", |r| r.ticker.clone();
    otc_trades: OtcTrade => OtcTradeId, "otc trade", |r| r.id;
    contracts: OptionContract => ContractId, "option contract", |r| r.id;
    sagas: SagaState => SagaUid, "saga state", |r| r.uid.clone();
}

fn merge<K: Ord, R>(table: &mut BTreeMap<K, R>, staged: BTreeMap<K, Option<R>>) {
    for (key, row) in staged {
        match row {
            Some(row) => {
                table.insert(key, row);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}

/// Serde adapter storing a keyed table as a plain array of rows.
mod rows {
    use super::Row;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, R>(table: &BTreeMap<R::Key, R>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        R: Row,
    {
        serializer.collect_seq(table.values())
    }

    pub fn deserialize<'de, D, R>(deserializer: D) -> Result<BTreeMap<R::Key, R>, D::Error>
    where
        D: Deserializer<'de>,
        R: Row,
    {
        let rows = Vec::<R>::deserialize(deserializer)?;
        Ok(rows.into_iter().map(|row| (row.key(), row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::Money;

    #[test]
    fn composite_keys_round_trip_through_json() {
        let mut tables = Tables::default();
        let position = Position::open(UserId::new(1), SecurityId::new(2), 10, Money::from_cents(1_000));
        tables.positions.insert(position.key(), position);

        let json = serde_json::to_string(&tables).unwrap();
        assert!(json.contains("\"positions\":[{"));

        let back: Tables = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tables);
    }

    #[test]
    fn missing_tables_default_to_empty() {
        let tables: Tables = serde_json::from_str("{}").unwrap();
        assert!(tables.orders.is_empty());
        assert!(tables.sagas.is_empty());
    }

    #[test]
    fn apply_inserts_and_deletes() {
        let mut tables = Tables::default();
        let position = Position::open(UserId::new(1), SecurityId::new(2), 10, Money::from_cents(1_000));
        let key = position.key();
        tables.positions.insert(key, position);

        let mut writes = WriteSet::default();
        assert!(writes.is_empty());
        Position::staged_mut(&mut writes).insert(key, None);
        assert!(!writes.is_empty());
        writes.apply(&mut tables);

        assert!(tables.positions.is_empty());
    }
}

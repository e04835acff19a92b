//! Accept OTC Offer Use Case
//!
//! Turns an OTC offer into an option contract and instructs the premium
//! transfer. If the instruction cannot be published the contract is removed
//! and the offer re-opened.

use std::sync::Arc;

use super::errors::CommandError;
use crate::application::dto::{AccountDto, PremiumPayment};
use crate::application::services::MessagingClient;
use crate::domain::otc::{ContractStatus, OptionContract, OtcTrade};
use crate::domain::portfolio::Position;
use crate::domain::shared::{OtcTradeId, Timestamp, UserId};
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::{Store, StoreTx};

/// Use case for accepting OTC offers.
#[derive(Debug)]
pub struct AcceptOtcOfferUseCase {
    store: Arc<Store>,
    locks: Arc<ResourceLocks>,
    messaging: MessagingClient,
}

impl AcceptOtcOfferUseCase {
    /// Create a new AcceptOtcOfferUseCase.
    #[must_use]
    pub const fn new(store: Arc<Store>, locks: Arc<ResourceLocks>, messaging: MessagingClient) -> Self {
        Self { store, locks, messaging }
    }

    /// Accept offer `trade_id` on behalf of `seller`.
    ///
    /// The account lookups block until the banking domain answers, so they
    /// run before the security lock is taken; the offer is validated again
    /// under the lock.
    pub async fn execute(&self, trade_id: OtcTradeId, seller: UserId) -> Result<OptionContract, CommandError> {
        let trade = Self::validate(&self.store.begin(), trade_id, seller)?;

        let seller_account = self.usd_account(trade.seller_id).await?;
        let buyer_account = self.usd_account(trade.buyer_id).await?;
        if buyer_account.balance < trade.premium.amount() {
            return Err(CommandError::rejected(format!(
                "buyer balance {} does not cover premium {}",
                buyer_account.balance, trade.premium
            )));
        }

        let _guard = self.locks.securities.lock(&trade.security_id).await;
        let mut tx = self.store.begin();
        let mut trade = Self::validate(&tx, trade_id, seller)?;

        let now = Timestamp::now();
        let contract = OptionContract {
            id: self.store.next_contract_id(),
            otc_trade_id: trade.id,
            buyer_id: trade.buyer_id,
            seller_id: trade.seller_id,
            security_id: trade.security_id,
            quantity: trade.quantity,
            strike_price: trade.strike_price,
            premium: trade.premium,
            settlement_at: trade.settlement_at,
            status: ContractStatus::Active,
            is_exercised: false,
            exercised_at: None,
            saga_uid: None,
            created_at: now,
        };
        tx.put(contract.clone());
        tx.put(trade.clone());
        tx.commit().await?;

        let payment = PremiumPayment {
            seller_account_id: seller_account.id,
            buyer_account_id: buyer_account.id,
            amount: trade.premium.amount(),
        };
        if let Err(e) = self.messaging.pay_premium(&payment).await {
            tracing::error!(otc_trade_id = %trade_id, error = %e, "Premium instruction failed, reverting acceptance");
            let mut tx = self.store.begin();
            tx.delete::<OptionContract>(&contract.id);
            trade.accepted = false;
            tx.put(trade);
            tx.commit().await?;
            return Err(e.into());
        }

        tracing::info!(otc_trade_id = %trade_id, contract_id = %contract.id, "OTC offer accepted");
        Ok(contract)
    }

    /// The offer as it would look once accepted by `seller`.
    fn validate(tx: &StoreTx<'_>, trade_id: OtcTradeId, seller: UserId) -> Result<OtcTrade, CommandError> {
        let mut trade = tx.require::<OtcTrade>(&trade_id)?;
        if trade.seller_id != seller {
            return Err(CommandError::rejected(format!(
                "user {seller} is not the seller of offer {trade_id}"
            )));
        }
        trade.accept()?;

        let offered = tx
            .get::<Position>(&trade.seller_position())
            .map_or(0, |p| p.public_count);
        let reserved: u64 = tx
            .scan::<OptionContract>(|c| c.seller_position() == trade.seller_position() && c.is_open())
            .iter()
            .map(|c| c.quantity)
            .sum();
        if reserved + trade.quantity > offered {
            return Err(CommandError::rejected(format!(
                "seller offers {offered} shares, {reserved} already under contract, {} requested",
                trade.quantity
            )));
        }
        Ok(trade)
    }

    async fn usd_account(&self, user_id: UserId) -> Result<AccountDto, CommandError> {
        self.messaging
            .usd_account(user_id)
            .await?
            .ok_or_else(|| CommandError::rejected(format!("user {user_id} has no USD account")))
    }
}

//! Exercise Option Use Case

use std::sync::Arc;

use super::errors::CommandError;
use crate::application::dto::{AccountDto, InitOtc};
use crate::application::services::{MessagingClient, OtcSettlementCoordinator};
use crate::domain::otc::OptionContract;
use crate::domain::shared::{ContractId, SagaUid, Timestamp, UserId};
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::Store;

/// Use case for exercising an option contract.
///
/// Attaches a fresh saga to the contract and asks the banking domain to
/// reserve the strike amount. The saga then advances as acknowledgements
/// arrive at the settlement coordinator.
#[derive(Debug)]
pub struct ExerciseOptionUseCase {
    store: Arc<Store>,
    locks: Arc<ResourceLocks>,
    coordinator: Arc<OtcSettlementCoordinator>,
    messaging: MessagingClient,
}

impl ExerciseOptionUseCase {
    /// Create a new ExerciseOptionUseCase.
    #[must_use]
    pub const fn new(
        store: Arc<Store>,
        locks: Arc<ResourceLocks>,
        coordinator: Arc<OtcSettlementCoordinator>,
        messaging: MessagingClient,
    ) -> Self {
        Self {
            store,
            locks,
            coordinator,
            messaging,
        }
    }

    /// Exercise `contract_id` on behalf of `buyer` and return the saga UID.
    pub async fn execute(&self, contract_id: ContractId, buyer: UserId) -> Result<SagaUid, CommandError> {
        let now = Timestamp::now();
        let contract = self.store.begin().require::<OptionContract>(&contract_id)?;
        contract.ensure_exercisable(buyer, now)?;

        let seller_account = self.usd_account(contract.seller_id).await?;
        let buyer_account = self.usd_account(contract.buyer_id).await?;

        let uid = SagaUid::for_exercise(contract_id, now);
        {
            let lease = self.coordinator.sagas().acquire(&uid).await;
            let _guard = self.locks.securities.lock(&contract.security_id).await;
            let mut tx = self.store.begin();

            let mut contract = tx.require::<OptionContract>(&contract_id)?;
            contract.ensure_exercisable(buyer, now)?;
            contract.saga_uid = Some(uid.clone());
            tx.put(contract);
            lease.start(&mut tx, contract_id, now)?;
            tx.commit().await?;
        }

        let init = InitOtc {
            uid: uid.clone(),
            seller_account_id: seller_account.id,
            buyer_account_id: buyer_account.id,
            amount: contract.exercise_amount().amount(),
        };
        if let Err(e) = self.messaging.init_otc(&init).await {
            tracing::error!(saga_uid = %uid, error = %e, "Exercise could not be initiated, rolling back");
            self.coordinator.rollback(&uid).await?;
            return Err(e.into());
        }

        tracing::info!(saga_uid = %uid, contract_id = %contract_id, amount = %init.amount, "Option exercise started");
        Ok(uid)
    }

    async fn usd_account(&self, user_id: UserId) -> Result<AccountDto, CommandError> {
        self.messaging
            .usd_account(user_id)
            .await?
            .ok_or_else(|| CommandError::rejected(format!("user {user_id} has no USD account")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::topics;
    use crate::application::ports::{MessagingError, MockMessageBusPort};
    use crate::application::services::SagaStateManager;
    use crate::domain::otc::{ContractStatus, SagaPhase};
    use crate::domain::shared::{Money, OtcTradeId, SecurityId};
    use crate::retry::FixedBackoff;
    use mockall::predicate::{always, function};
    use rust_decimal_macros::dec;

    const CONTRACT: ContractId = ContractId::new(6);

    async fn seeded() -> Arc<Store> {
        let store = Arc::new(Store::in_memory());
        let now = Timestamp::now();
        let mut tx = store.begin();
        tx.put(OptionContract {
            id: CONTRACT,
            otc_trade_id: OtcTradeId::new(1),
            buyer_id: UserId::new(2),
            seller_id: UserId::new(1),
            security_id: SecurityId::new(9),
            quantity: 4,
            strike_price: Money::new(dec!(25)),
            premium: Money::new(dec!(3)),
            settlement_at: now.plus_seconds(86_400),
            status: ContractStatus::Active,
            is_exercised: false,
            exercised_at: None,
            saga_uid: None,
            created_at: now,
        });
        tx.commit().await.unwrap();
        store
    }

    fn use_case(store: &Arc<Store>, mut bus: MockMessageBusPort) -> ExerciseOptionUseCase {
        bus.expect_request()
            .with(function(|topic: &str| topic == topics::GET_ACCOUNTS_BY_USER), always())
            .returning(|_, body| {
                let user: serde_json::Value = serde_json::from_slice(&body).unwrap();
                let id = user["userId"].as_u64().unwrap();
                Ok(format!(
                    r#"{{"accounts":[{{"id":{},"ownerID":{id},"balance":1000,"currencyType":"USD"}}]}}"#,
                    id + 40
                )
                .into_bytes())
            });
        let locks = Arc::new(ResourceLocks::new());
        let messaging = MessagingClient::new(Arc::new(bus));
        let coordinator = Arc::new(OtcSettlementCoordinator::new(
            Arc::clone(store),
            SagaStateManager::new(Arc::clone(&locks)),
            messaging.clone(),
            FixedBackoff::from_millis(1),
        ));
        ExerciseOptionUseCase::new(Arc::clone(store), locks, coordinator, messaging)
    }

    #[tokio::test]
    async fn exercise_starts_saga_and_reserves_strike() {
        let store = seeded().await;
        let mut bus = MockMessageBusPort::new();
        bus.expect_publish()
            .with(function(|topic: &str| topic == topics::INIT_OTC), always())
            .times(1)
            .returning(|_, body| {
                let init: InitOtc = serde_json::from_slice(&body).unwrap();
                assert_eq!(init.amount, dec!(100));
                assert_eq!(init.seller_account_id.value(), 41);
                assert_eq!(init.buyer_account_id.value(), 42);
                Ok(())
            });

        let uid = use_case(&store, bus).execute(CONTRACT, UserId::new(2)).await.unwrap();

        assert!(uid.as_str().starts_with("OTC-6-"));
        let tables = store.snapshot();
        assert_eq!(tables.sagas[&uid].phase, SagaPhase::Init);
        assert_eq!(tables.contracts[&CONTRACT].saga_uid.as_ref(), Some(&uid));
    }

    #[tokio::test]
    async fn second_exercise_is_rejected() {
        let store = seeded().await;
        let mut bus = MockMessageBusPort::new();
        bus.expect_publish().returning(|_, _| Ok(()));
        let use_case = use_case(&store, bus);

        use_case.execute(CONTRACT, UserId::new(2)).await.unwrap();
        let err = use_case.execute(CONTRACT, UserId::new(2)).await.unwrap_err();
        assert!(err.to_string().contains("EXERCISE_IN_PROGRESS"));
    }

    #[tokio::test]
    async fn only_buyer_may_exercise() {
        let store = seeded().await;
        let err = use_case(&store, MockMessageBusPort::new())
            .execute(CONTRACT, UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Domain(_)));
    }

    #[tokio::test]
    async fn failed_init_publish_discards_saga() {
        let store = seeded().await;
        let mut bus = MockMessageBusPort::new();
        bus.expect_publish().returning(|topic, _| {
            Err(MessagingError::Closed {
                topic: topic.to_string(),
            })
        });

        let err = use_case(&store, bus).execute(CONTRACT, UserId::new(2)).await.unwrap_err();

        assert!(matches!(err, CommandError::Messaging(_)));
        let tables = store.snapshot();
        assert!(tables.sagas.is_empty());
        assert_eq!(tables.contracts[&CONTRACT].saga_uid, None);
    }
}

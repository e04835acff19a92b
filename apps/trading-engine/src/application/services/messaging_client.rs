//! Messaging Client
//!
//! Typed access to the message bus: every topic gets its payload type, and
//! JSON encoding happens here rather than at each call site.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::dto::{
    AccountDto, ActuaryDto, CustomerDto, InitOtc, OtcAck, PremiumPayment, UserAccountsRequest,
    UserAccountsResponse, topics,
};
use crate::application::ports::{Delivery, MessageBusPort, MessagingError, Subscription};
use crate::domain::shared::UserId;

/// Typed client over a [`MessageBusPort`].
#[derive(Clone)]
pub struct MessagingClient {
    bus: Arc<dyn MessageBusPort>,
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient").finish_non_exhaustive()
    }
}

impl MessagingClient {
    /// Wrap `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBusPort>) -> Self {
        Self { bus }
    }

    /// Start the remote reservation for an exercise.
    pub async fn init_otc(&self, body: &InitOtc) -> Result<(), MessagingError> {
        self.publish(topics::INIT_OTC, body).await
    }

    /// Report a local phase outcome to the banking domain.
    pub async fn ack_banking(&self, body: &OtcAck) -> Result<(), MessagingError> {
        self.publish(topics::OTC_ACK_BANKING, body).await
    }

    /// Instruct the premium transfer for an accepted offer.
    pub async fn pay_premium(&self, body: &PremiumPayment) -> Result<(), MessagingError> {
        self.publish(topics::OTC_PAY_PREMIUM, body).await
    }

    /// Every account `user_id` owns.
    pub async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<AccountDto>, MessagingError> {
        let reply: UserAccountsResponse = self
            .request(topics::GET_ACCOUNTS_BY_USER, &UserAccountsRequest { user_id })
            .await?;
        Ok(reply.accounts)
    }

    /// The first USD account `user_id` owns, if any.
    pub async fn usd_account(&self, user_id: UserId) -> Result<Option<AccountDto>, MessagingError> {
        let accounts = self.accounts_for_user(user_id).await?;
        Ok(accounts.into_iter().find(AccountDto::is_usd))
    }

    /// Customer profile.
    pub async fn customer(&self, user_id: UserId) -> Result<CustomerDto, MessagingError> {
        self.request(topics::GET_CUSTOMER, &user_id).await
    }

    /// Actuary record.
    pub async fn actuary(&self, user_id: UserId) -> Result<ActuaryDto, MessagingError> {
        self.request(topics::GET_ACTUARY, &user_id).await
    }

    /// Consume the acknowledgements that drive the settlement saga.
    pub async fn subscribe_acks(&self) -> Result<Subscription, MessagingError> {
        self.bus.subscribe(topics::OTC_ACK_TRADING).await
    }

    /// Decode a delivery body.
    pub fn decode<T: DeserializeOwned>(delivery: &Delivery) -> Result<T, MessagingError> {
        serde_json::from_slice(&delivery.body).map_err(|source| MessagingError::Codec {
            topic: delivery.topic.clone(),
            source,
        })
    }

    async fn publish<T: Serialize + Sync>(&self, topic: &str, body: &T) -> Result<(), MessagingError> {
        let bytes = encode(topic, body)?;
        self.bus.publish(topic, bytes).await
    }

    async fn request<Req, Resp>(&self, topic: &str, body: &Req) -> Result<Resp, MessagingError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let bytes = encode(topic, body)?;
        let reply = self.bus.request(topic, bytes).await?;
        serde_json::from_slice(&reply).map_err(|source| MessagingError::Codec {
            topic: topic.to_string(),
            source,
        })
    }
}

fn encode<T: Serialize>(topic: &str, body: &T) -> Result<Vec<u8>, MessagingError> {
    serde_json::to_vec(body).map_err(|source| MessagingError::Codec {
        topic: topic.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockMessageBusPort;
    use crate::domain::shared::{AccountId, SagaUid};
    use mockall::predicate::{always, eq, function};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn init_otc_is_published_as_json() {
        let mut bus = MockMessageBusPort::new();
        bus.expect_publish()
            .with(function(|topic: &str| topic == topics::INIT_OTC), always())
            .times(1)
            .returning(|_, body| {
                let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
                assert_eq!(value["amount"], serde_json::json!(500.0));
                Ok(())
            });

        let client = MessagingClient::new(Arc::new(bus));
        client
            .init_otc(&InitOtc {
                uid: SagaUid::from("OTC-1-1"),
                seller_account_id: AccountId::new(1),
                buyer_account_id: AccountId::new(2),
                amount: dec!(500),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn usd_account_skips_other_currencies() {
        let mut bus = MockMessageBusPort::new();
        bus.expect_request()
            .with(function(|topic: &str| topic == topics::GET_ACCOUNTS_BY_USER), eq(br#"{"userId":3}"#.to_vec()))
            .returning(|_, _| {
                Ok(br#"{"accounts":[
                    {"id":1,"ownerID":3,"balance":10,"currencyType":"EUR"},
                    {"id":2,"ownerID":3,"balance":99.5,"currencyType":"USD"}
                ]}"#
                .to_vec())
            });

        let client = MessagingClient::new(Arc::new(bus));
        let account = client.usd_account(UserId::new(3)).await.unwrap().unwrap();
        assert_eq!(account.id, AccountId::new(2));
        assert_eq!(account.balance, dec!(99.5));
    }

    #[tokio::test]
    async fn malformed_reply_is_codec_error() {
        let mut bus = MockMessageBusPort::new();
        bus.expect_request().returning(|_, _| Ok(b"not json".to_vec()));

        let client = MessagingClient::new(Arc::new(bus));
        let err = client.customer(UserId::new(1)).await.unwrap_err();
        assert!(matches!(err, MessagingError::Codec { .. }));
    }

    #[tokio::test]
    async fn actuary_lookup_sends_bare_id() {
        let mut bus = MockMessageBusPort::new();
        bus.expect_request()
            .with(function(|topic: &str| topic == topics::GET_ACTUARY), eq(b"8".to_vec()))
            .returning(|_, _| {
                Ok(br#"{"userID":8,"role":"agent","limitAmount":1000,"usedLimit":250,"needApproval":false}"#.to_vec())
            });

        let client = MessagingClient::new(Arc::new(bus));
        let actuary = client.actuary(UserId::new(8)).await.unwrap();
        assert_eq!(actuary.role, "agent");
        assert_eq!(actuary.used_limit, dec!(250));
    }
}

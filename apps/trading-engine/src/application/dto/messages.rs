//! Payloads exchanged with other domains over the message bus.
//!
//! Amounts are decimals encoded as JSON numbers. Unknown fields are ignored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{AccountId, SagaUid, UserId};

/// Topic names.
pub mod topics {
    /// Starts the remote reservation for an option exercise.
    pub const INIT_OTC: &str = "init-otc";
    /// Acknowledgements from the banking domain that drive the saga.
    pub const OTC_ACK_TRADING: &str = "otc-ack-trading";
    /// Phase outcomes reported back to the banking domain.
    pub const OTC_ACK_BANKING: &str = "otc-ack-banking";
    /// Premium transfer instruction for an accepted offer.
    pub const OTC_PAY_PREMIUM: &str = "otc-pay-premium";
    /// Bank accounts of a user.
    pub const GET_ACCOUNTS_BY_USER: &str = "get-accounts-by-user";
    /// Customer profile lookup.
    pub const GET_CUSTOMER: &str = "get-customer";
    /// Actuary record lookup.
    pub const GET_ACTUARY: &str = "get-actuary";
}

/// `init-otc` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOtc {
    /// Saga identifier.
    pub uid: SagaUid,
    /// Seller's USD account.
    pub seller_account_id: AccountId,
    /// Buyer's USD account.
    pub buyer_account_id: AccountId,
    /// Strike price times quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// `otc-ack-trading` and `otc-ack-banking` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtcAck {
    /// Saga identifier.
    pub uid: SagaUid,
    /// Whether the sender's phase failed.
    #[serde(default)]
    pub failure: bool,
    /// Free-form detail.
    #[serde(default)]
    pub message: String,
}

impl OtcAck {
    /// A success acknowledgement.
    #[must_use]
    pub fn success(uid: SagaUid, message: impl Into<String>) -> Self {
        Self {
            uid,
            failure: false,
            message: message.into(),
        }
    }

    /// A failure acknowledgement.
    #[must_use]
    pub fn failure(uid: SagaUid, message: impl Into<String>) -> Self {
        Self {
            uid,
            failure: true,
            message: message.into(),
        }
    }
}

/// `otc-pay-premium` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumPayment {
    /// Account credited with the premium.
    pub seller_account_id: AccountId,
    /// Account debited.
    pub buyer_account_id: AccountId,
    /// Premium.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// `get-accounts-by-user` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountsRequest {
    /// User whose accounts are requested.
    pub user_id: UserId,
}

/// `get-accounts-by-user` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccountsResponse {
    /// Every account the user owns.
    #[serde(default)]
    pub accounts: Vec<AccountDto>,
}

/// A bank account as reported by the banking domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    /// Account id.
    pub id: AccountId,
    /// Owner.
    #[serde(rename = "ownerID")]
    pub owner_id: UserId,
    /// Human-readable account number.
    #[serde(default)]
    pub account_number: String,
    /// Available balance.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    /// ISO currency code.
    pub currency_type: String,
}

impl AccountDto {
    /// Whether this account holds US dollars.
    #[must_use]
    pub fn is_usd(&self) -> bool {
        self.currency_type.eq_ignore_ascii_case("USD")
    }
}

/// `get-customer` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerDto {
    /// Customer id.
    pub id: UserId,
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// Login name.
    #[serde(default)]
    pub username: String,
}

/// `get-actuary` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuaryDto {
    /// Actuary's user id.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// `agent` or `supervisor`.
    pub role: String,
    /// Credit limit.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub limit_amount: Decimal,
    /// Credit consumed.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub used_limit: Decimal,
    /// Whether the actuary's orders need supervisor approval.
    #[serde(default)]
    pub need_approval: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn init_otc_wire_shape() {
        let body = InitOtc {
            uid: SagaUid::from("OTC-1-1700000000"),
            seller_account_id: AccountId::new(11),
            buyer_account_id: AccountId::new(22),
            amount: dec!(1050.5),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "uid": "OTC-1-1700000000",
                "sellerAccountId": 11,
                "buyerAccountId": 22,
                "amount": 1050.5
            })
        );
    }

    #[test]
    fn ack_tolerates_missing_and_unknown_fields() {
        let ack: OtcAck = serde_json::from_str(r#"{"uid":"OTC-9-1","extra":true}"#).unwrap();
        assert_eq!(ack.uid.as_str(), "OTC-9-1");
        assert!(!ack.failure);
        assert!(ack.message.is_empty());
    }

    #[test]
    fn account_reply_decodes() {
        let reply: UserAccountsResponse = serde_json::from_str(
            r#"{"accounts":[{"id":5,"ownerID":3,"accountNumber":"111","balance":250.75,"currencyType":"USD","subtype":"personal"}]}"#,
        )
        .unwrap();
        let account = &reply.accounts[0];
        assert!(account.is_usd());
        assert_eq!(account.balance, dec!(250.75));
        assert_eq!(account.owner_id, UserId::new(3));
    }

    #[test]
    fn customer_reply_uses_pascal_case() {
        let customer: CustomerDto =
            serde_json::from_str(r#"{"Id":4,"FirstName":"Ana","LastName":"Ilic","Username":"ana"}"#).unwrap();
        assert_eq!(customer.id, UserId::new(4));
        assert_eq!(customer.first_name, "Ana");
    }
}

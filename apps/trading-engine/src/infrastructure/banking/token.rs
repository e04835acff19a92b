//! HS256 settlement tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::{GatewayError, SettlementRequest};
use crate::domain::shared::Timestamp;

/// Claims carried by a settlement token.
///
/// Amounts are strings with six decimal places, as the banking service
/// parses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementClaims {
    /// `buy` or `sell`.
    pub direction: String,
    /// Owner of the order.
    pub user_id: u64,
    /// Account the funds move through.
    pub account_id: u64,
    /// Step notional.
    pub amount: String,
    /// Commission.
    pub fee: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Unique token id; the banking service rejects replays.
    pub jti: String,
}

/// Signs and verifies settlement tokens with a shared secret.
#[derive(Clone)]
pub struct SettlementTokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for SettlementTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementTokenSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SettlementTokenSigner {
    /// Create a signer for `secret` whose tokens live `ttl_secs`.
    #[must_use]
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Sign a token authorizing `request`, issued at `now`.
    pub fn sign(&self, request: &SettlementRequest, now: Timestamp) -> Result<String, GatewayError> {
        let iat = now.unix_seconds();
        let claims = SettlementClaims {
            direction: request.direction.as_str().to_string(),
            user_id: request.user_id.value(),
            account_id: request.account_id.value(),
            amount: format!("{:.6}", request.amount.amount()),
            fee: format!("{:.6}", request.fee.amount()),
            iat,
            exp: iat.saturating_add(self.ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| GatewayError::Token {
            message: e.to_string(),
        })
    }

    /// Decode and validate a token signed with the same secret.
    pub fn verify(&self, token: &str) -> Result<SettlementClaims, GatewayError> {
        decode::<SettlementClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| GatewayError::Token {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderSide;
    use crate::domain::shared::{AccountId, Money, UserId};
    use rust_decimal_macros::dec;

    fn request() -> SettlementRequest {
        SettlementRequest {
            direction: OrderSide::Buy,
            user_id: UserId::new(1),
            account_id: AccountId::new(2),
            amount: Money::new(dec!(100.5)),
            fee: Money::new(dec!(1.5)),
        }
    }

    #[test]
    fn claims_round_trip() {
        let signer = SettlementTokenSigner::new("test-secret-key", 300);
        let token = signer.sign(&request(), Timestamp::now()).unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.direction, "buy");
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.account_id, 2);
        assert_eq!(claims.amount, "100.500000");
        assert_eq!(claims.fee, "1.500000");
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn every_token_is_unique() {
        let signer = SettlementTokenSigner::new("k", 60);
        let now = Timestamp::now();
        let a = signer.verify(&signer.sign(&request(), now).unwrap()).unwrap();
        let b = signer.verify(&signer.sign(&request(), now).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = SettlementTokenSigner::new("a", 60).sign(&request(), Timestamp::now()).unwrap();
        let err = SettlementTokenSigner::new("b", 60).verify(&token).unwrap_err();
        assert!(matches!(err, GatewayError::Token { .. }));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = SettlementTokenSigner::new("k", 1);
        let issued = Timestamp::now().plus_seconds(-3_600);
        let token = signer.sign(&request(), issued).unwrap();
        assert!(signer.verify(&token).is_err());
    }
}

//! HTTP adapter for the banking service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::token::SettlementTokenSigner;
use crate::application::ports::{BankingGatewayPort, GatewayError, SettlementRequest};
use crate::config::BankingConfig;
use crate::domain::shared::Timestamp;
use crate::observability::metrics;

/// Posts settlement tokens to `{base_url}/orders/execute/{token}`.
///
/// Any 2xx is a settled step. There is no request timeout unless one is
/// configured.
#[derive(Debug, Clone)]
pub struct HttpBankingGateway {
    client: Client,
    base_url: String,
    signer: SettlementTokenSigner,
}

impl HttpBankingGateway {
    /// Create a gateway from config.
    pub fn new(config: &BankingConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| GatewayError::Transport {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signer: SettlementTokenSigner::new(&config.token_secret, config.token_ttl_secs),
        })
    }

    /// Signer used for outgoing tokens.
    #[must_use]
    pub const fn signer(&self) -> &SettlementTokenSigner {
        &self.signer
    }

    async fn post_token(&self, token: &str) -> Result<(), GatewayError> {
        let url = format!("{}/orders/execute/{token}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GatewayError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl BankingGatewayPort for HttpBankingGateway {
    async fn settle(&self, request: &SettlementRequest) -> Result<(), GatewayError> {
        let started = Instant::now();
        let result = match self.signer.sign(request, Timestamp::now()) {
            Ok(token) => self.post_token(&token).await,
            Err(e) => Err(e),
        };
        let latency = started.elapsed().as_secs_f64();

        match &result {
            Ok(()) => {
                metrics::record_gateway_request("ok", latency);
                tracing::debug!(
                    user_id = %request.user_id,
                    amount = %request.amount,
                    fee = %request.fee,
                    "Settlement accepted"
                );
            }
            Err(e) => {
                metrics::record_gateway_request(e.label(), latency);
                tracing::warn!(
                    user_id = %request.user_id,
                    amount = %request.amount,
                    error = %e,
                    "Settlement failed"
                );
            }
        }
        result
    }
}

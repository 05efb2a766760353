use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::{config::GatewayConfig, errors::ServiceError};

use super::{
    to_minor_units, verify_signature, GatewaySession, InitializeSessionRequest, PaymentGateway,
    Verification,
};

/// HTTP implementation of the gateway interface against a provider-style
/// JSON API. Transport errors and timeouts map to `GatewayUnavailable`;
/// non-success response bodies map to `GatewayRejected`.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_tolerance_secs: u64,
}

#[derive(Debug, Serialize)]
struct SessionBody {
    reference: String,
    amount_minor: i64,
    currency: String,
    customer_email: String,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    redirect_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    amount_minor: i64,
    authorization_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("gateway client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_tolerance_secs: config.webhook_tolerance_secs,
        })
    }

    fn map_transport_error(err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::GatewayUnavailable("request timed out".to_string())
        } else {
            ServiceError::GatewayUnavailable(err.to_string())
        }
    }

    async fn rejection_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ProviderErrorBody>().await {
            Ok(body) => body
                .message
                .unwrap_or_else(|| format!("provider returned {}", status)),
            Err(_) => format!("provider returned {}", status),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initialize_session(
        &self,
        request: InitializeSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let body = SessionBody {
            reference: request.order_id.to_string(),
            amount_minor: to_minor_units(request.amount)?,
            currency: request.currency.clone(),
            customer_email: request.customer_email.clone(),
            callback_url: request.callback_url.clone(),
        };

        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            let message = Self::rejection_message(response).await;
            warn!(order_id = %request.order_id, %message, "Gateway rejected session init");
            return Err(ServiceError::GatewayRejected(message));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed response: {}", e)))?;

        Ok(GatewaySession {
            redirect_url: session.redirect_url,
            session_reference: session.reference,
        })
    }

    #[instrument(skip(self))]
    async fn verify(&self, session_reference: &str) -> Result<Verification, ServiceError> {
        let response = self
            .client
            .get(format!("{}/sessions/{}", self.base_url, session_reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            let message = Self::rejection_message(response).await;
            return Err(ServiceError::GatewayRejected(message));
        }

        let verification: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed response: {}", e)))?;

        Ok(Verification {
            succeeded: verification.status == "success",
            amount_minor: verification.amount_minor,
            authorization_token: verification.authorization_token,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> bool {
        verify_signature(
            &self.secret_key,
            payload,
            signature_header,
            self.webhook_tolerance_secs,
            Utc::now(),
        )
    }
}

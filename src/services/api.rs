//! HTTP client for the subscription API.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{ApiError, SessionToken, SubscriptionApi, TunnelCredential};
use crate::constants;

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
}

/// Error envelope used by the API, on failures and sometimes with HTTP 200.
#[derive(Deserialize)]
struct ErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Blocking client for sign-in and key issuance.
pub struct HttpSubscriptionApi {
    client: Client,
    base_url: Url,
    receipt_path: Option<PathBuf>,
}

impl HttpSubscriptionApi {
    /// Build a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        base_url: Url,
        receipt_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", constants::APP_NAME, constants::APP_VERSION))
            .build()?;
        Ok(Self {
            client,
            base_url,
            receipt_path,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn read_receipt(&self) -> Result<String, ApiError> {
        let Some(path) = &self.receipt_path else {
            log::info!("[api] no receipt path configured");
            return Err(ApiError::NoSubscriptionInReceipt);
        };
        match std::fs::read_to_string(path) {
            Ok(receipt) if !receipt.trim().is_empty() => Ok(receipt.trim().to_string()),
            Ok(_) => {
                log::info!("[api] receipt at {} is empty", path.display());
                Err(ApiError::NoSubscriptionInReceipt)
            }
            Err(e) => {
                log::info!("[api] no receipt at {}: {e}", path.display());
                Err(ApiError::NoSubscriptionInReceipt)
            }
        }
    }
}

/// Read a response body, turning API error envelopes into [`ApiError`].
fn read_body(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    if let Some(error) = parse_error_body(&body) {
        return Err(error);
    }
    if !status.is_success() {
        return Err(ApiError::Other {
            code: i64::from(status.as_u16()),
            message: body.chars().take(200).collect(),
        });
    }
    Ok(body)
}

/// Classify an error envelope. Code 0 means success.
fn parse_error_body(body: &str) -> Option<ApiError> {
    let envelope: ErrorBody = serde_json::from_str(body).ok()?;
    if envelope.code == 0 {
        return None;
    }
    Some(ApiError::from_code(envelope.code, envelope.message))
}

impl SubscriptionApi for HttpSubscriptionApi {
    fn authenticate(&self) -> Result<SessionToken, ApiError> {
        let receipt = self.read_receipt()?;
        let url = self.endpoint(constants::API_SIGNIN_PATH)?;
        log::debug!("[api] signing in at {url}");

        let response = self
            .client
            .post(url)
            .json(&json!({ "receipt": receipt, "platform": std::env::consts::OS }))
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let body = read_body(response)?;
        let signin: SignInResponse = serde_json::from_str(&body).map_err(|e| ApiError::Other {
            code: 0,
            message: format!("unexpected sign-in response: {e}"),
        })?;
        log::info!("[api] signed in");
        Ok(SessionToken(signin.token))
    }

    fn fetch_credential(&self, session: &SessionToken) -> Result<TunnelCredential, ApiError> {
        let url = self.endpoint(constants::API_GET_KEY_PATH)?;
        log::debug!("[api] requesting tunnel key at {url}");

        let response = self
            .client
            .post(url)
            .bearer_auth(&session.0)
            .json(&json!({ "platform": std::env::consts::OS }))
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let body = read_body(response)?;
        let credential: TunnelCredential =
            serde_json::from_str(&body).map_err(|e| ApiError::Other {
                code: 0,
                message: format!("unexpected key response: {e}"),
            })?;
        log::info!("[api] received tunnel key {}", credential.id);
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_with_receipt(receipt_path: Option<PathBuf>) -> HttpSubscriptionApi {
        HttpSubscriptionApi::new(
            Url::parse("https://api.example.invalid/").unwrap(),
            receipt_path,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_error_body_classification() {
        assert_eq!(
            parse_error_body(r#"{"code": 38, "message": "expired"}"#),
            Some(ApiError::NoActiveSubscription)
        );
        assert_eq!(
            parse_error_body(r#"{"code": 9}"#),
            Some(ApiError::NoSubscriptionInReceipt)
        );
        assert_eq!(
            parse_error_body(r#"{"code": 1, "message": "user not found"}"#),
            Some(ApiError::Other {
                code: 1,
                message: "user not found".to_string()
            })
        );
        assert_eq!(parse_error_body(r#"{"code": 0}"#), None);
        assert_eq!(parse_error_body(r#"{"token": "abc"}"#), None);
        assert_eq!(parse_error_body("<html>"), None);
    }

    #[test]
    fn test_credential_response_shape() {
        let credential: TunnelCredential =
            serde_json::from_str(r#"{"id": "k-1", "b64": "AAEC"}"#).unwrap();
        assert_eq!(credential.id, "k-1");
        assert_eq!(credential.key_base64, "AAEC");
    }

    #[test]
    fn test_missing_receipt_means_no_subscription() {
        let api = api_with_receipt(None);
        assert_eq!(api.authenticate(), Err(ApiError::NoSubscriptionInReceipt));

        let api = api_with_receipt(Some(PathBuf::from("/nonexistent/lockdown/receipt")));
        assert_eq!(api.authenticate(), Err(ApiError::NoSubscriptionInReceipt));
    }

    #[test]
    fn test_endpoints_are_relative_to_base() {
        let api = api_with_receipt(None);
        assert_eq!(
            api.endpoint(constants::API_GET_KEY_PATH).unwrap().as_str(),
            "https://api.example.invalid/get-key"
        );
    }
}

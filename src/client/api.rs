use crate::error::ErrorResponse;
use crate::models::{CheckPaymentResponse, VerifyPaymentRequest, VerifyPaymentResponse};
use anyhow::{bail, Result};
use reqwest::{Client, Response};

/// HTTP client for the verifier's payment endpoints.
pub struct VerifierApi {
    client: Client,
    base_url: String,
}

impl VerifierApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn check_payment(
        &self,
        campaign_id: u64,
        task_index: u32,
        user_address: &str,
    ) -> Result<CheckPaymentResponse> {
        let response = self
            .client
            .get(format!("{}/check-payment", self.base_url))
            .query(&[
                ("campaignId", campaign_id.to_string()),
                ("taskIndex", task_index.to_string()),
                ("userAddress", user_address.to_string()),
            ])
            .send()
            .await?;

        Ok(Self::success(response).await?.json().await?)
    }

    pub async fn verify_payment(&self, request: &VerifyPaymentRequest) -> Result<VerifyPaymentResponse> {
        let response = self
            .client
            .post(format!("{}/verify-payment", self.base_url))
            .json(request)
            .send()
            .await?;

        Ok(Self::success(response).await?.json().await?)
    }

    async fn success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => bail!("{} ({}): {}", status, error.error_code, error.error),
            Err(_) => bail!("{}: {}", status, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn check_payment_sends_camel_case_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/check-payment")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("campaignId".into(), "4".into()),
                Matcher::UrlEncoded("taskIndex".into(), "1".into()),
                Matcher::UrlEncoded(
                    "userAddress".into(),
                    "0x1111111111111111111111111111111111111111".into(),
                ),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "campaignId": 4,
                    "taskIndex": 1,
                    "userAddress": "0x1111111111111111111111111111111111111111",
                    "verified": false,
                    "payment": {
                        "description": "Send 1 ETH to 0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa on sepolia",
                        "terms": {
                            "recipientAddress": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                            "amountBaseUnits": "1000000000000000000",
                            "tokenAddress": null,
                            "tokenSymbol": "ETH",
                            "networkId": 11155111,
                            "networkName": "sepolia"
                        }
                    }
                }"#,
            )
            .create_async()
            .await;

        let api = VerifierApi::new(&format!("{}/", server.url()));
        let status = api
            .check_payment(4, 1, "0x1111111111111111111111111111111111111111")
            .await
            .unwrap();

        assert!(!status.verified);
        assert_eq!(status.payment.terms.network_id, 11_155_111);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_bodies_become_readable_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/verify-payment")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "success": false,
                    "verified": false,
                    "error": "Transaction 0xab has already been used for another verification",
                    "errorCode": "TRANSACTION_ALREADY_USED",
                    "timestamp": "2026-01-01T00:00:00Z",
                    "requestId": "00000000-0000-0000-0000-000000000000"
                }"#,
            )
            .create_async()
            .await;

        let api = VerifierApi::new(&server.url());
        let err = api
            .verify_payment(&VerifyPaymentRequest {
                campaign_id: 1,
                task_index: 0,
                transaction_hash: format!("0x{}", "ab".repeat(32)),
                user_address: "0x1111111111111111111111111111111111111111".into(),
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("TRANSACTION_ALREADY_USED"));
    }
}

use crate::{
    error::{AirdropError, Result},
    models::{
        format_address, parse_address, CheckPaymentQuery, CheckPaymentResponse, PaymentSummary,
        PaymentTerms, TaskKey, TaskMetadata, VerificationKey, VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    services::{PaymentVerifier, TaskMetadataStore, VerificationCache},
};
use axum::{
    extract::{Query, State},
    Json,
};
use ethers::types::H256;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct PaymentState {
    pub tasks: Arc<TaskMetadataStore>,
    pub verifications: Arc<VerificationCache>,
    pub verifier: Arc<PaymentVerifier>,
}

fn parse_tx_hash(raw: &str) -> Result<H256> {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if hex.len() != 64 {
        return Err(AirdropError::InvalidRequest(format!(
            "Invalid transaction hash: {}",
            raw
        )));
    }
    H256::from_str(hex)
        .map_err(|e| AirdropError::InvalidRequest(format!("Invalid transaction hash: {}", e)))
}

fn verification_key(task: TaskKey, user_address: &str) -> Result<VerificationKey> {
    let user = parse_address(user_address).ok_or_else(|| {
        AirdropError::InvalidRequest(format!("Invalid user address: {}", user_address))
    })?;
    Ok(VerificationKey::new(task, &format_address(&user)))
}

fn payment_terms(metadata: &TaskMetadata) -> Result<&PaymentTerms> {
    metadata
        .payment
        .as_ref()
        .ok_or(AirdropError::TaskNotPayable {
            campaign_id: metadata.campaign_id,
            task_index: metadata.task_index,
        })
}

pub async fn verify_payment(
    State(state): State<PaymentState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    let task = TaskKey::new(request.campaign_id, request.task_index);
    let key = verification_key(task, &request.user_address)?;
    let tx_hash = parse_tx_hash(&request.transaction_hash)?;

    let metadata = state.tasks.require(task).await?;
    let terms = payment_terms(&metadata)?;

    if let Some(existing) = state.verifications.get_verified(&key).await? {
        tracing::debug!(triple = %key, "Payment already verified");
        return Ok(Json(VerifyPaymentResponse {
            verified: true,
            error: None,
            error_code: None,
            transaction_hash: Some(existing.transaction_hash.clone()),
            already_verified: true,
        }));
    }

    // Skip the RPC round trip for hashes already credited elsewhere.
    state.verifications.ensure_unclaimed(&key, &tx_hash).await?;

    let verification = state.verifier.verify(tx_hash, terms).await?;

    if let Some(rejection) = verification.rejection {
        let message = rejection.to_string();
        state
            .verifications
            .record_attempt(&key, &tx_hash, &message)
            .await?;

        return Ok(Json(VerifyPaymentResponse {
            verified: false,
            error: Some(message),
            error_code: Some(rejection.code().to_string()),
            transaction_hash: None,
            already_verified: false,
        }));
    }

    tracing::info!(
        triple = %key,
        tx_hash = ?verification.tx_hash,
        payer = ?verification.payer,
        amount = ?verification.amount,
        "Payment accepted on chain"
    );

    let outcome = state
        .verifications
        .record_verification(&key, &tx_hash)
        .await?;

    Ok(Json(VerifyPaymentResponse {
        verified: true,
        error: None,
        error_code: None,
        transaction_hash: Some(outcome.record.transaction_hash),
        already_verified: !outcome.newly_verified,
    }))
}

pub async fn check_payment(
    State(state): State<PaymentState>,
    Query(query): Query<CheckPaymentQuery>,
) -> Result<Json<CheckPaymentResponse>> {
    let task = TaskKey::new(query.campaign_id, query.task_index);
    let key = verification_key(task, &query.user_address)?;

    let metadata = state.tasks.require(task).await?;
    let terms = payment_terms(&metadata)?;
    let record = state.verifications.get(&key).await?;

    let verified = record.as_ref().is_some_and(|r| r.verified);

    Ok(Json(CheckPaymentResponse {
        campaign_id: key.campaign_id,
        task_index: key.task_index,
        user_address: key.user_address.clone(),
        verified,
        transaction_hash: record
            .as_ref()
            .filter(|r| r.verified)
            .map(|r| r.transaction_hash.clone()),
        verified_at: record.and_then(|r| r.verified_at),
        payment: PaymentSummary {
            description: terms.describe(),
            terms: terms.clone(),
        },
    }))
}

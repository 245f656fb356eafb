use crate::error::{PaymentRejection, Result};
use crate::models::{format_address, PaymentTerms};
use crate::services::ChainRegistry;
use ethers::{
    types::{Address, TransactionReceipt, H256, U256},
    utils::keccak256,
};

/// keccak256("Transfer(address,address,uint256)")
pub fn transfer_topic() -> H256 {
    H256::from(keccak256(b"Transfer(address,address,uint256)"))
}

#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub verified: bool,
    pub tx_hash: H256,
    pub rejection: Option<PaymentRejection>,
    pub payer: Option<Address>,
    pub amount: Option<U256>,
}

impl PaymentVerification {
    fn accepted(tx_hash: H256, payer: Address, amount: U256) -> Self {
        Self {
            verified: true,
            tx_hash,
            rejection: None,
            payer: Some(payer),
            amount: Some(amount),
        }
    }

    fn rejected(tx_hash: H256, rejection: PaymentRejection) -> Self {
        Self {
            verified: false,
            tx_hash,
            rejection: Some(rejection),
            payer: None,
            amount: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenTransfer {
    from: Address,
    to: Address,
    amount: U256,
}

/// Checks a submitted transaction against a task's payment terms.
///
/// Every check is exact: no amount tolerance, no retries. `Ok` carries a
/// definitive answer; `Err` means the chain could not be asked.
pub struct PaymentVerifier {
    chains: ChainRegistry,
}

impl PaymentVerifier {
    pub fn new(chains: ChainRegistry) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub async fn verify(&self, tx_hash: H256, expected: &PaymentTerms) -> Result<PaymentVerification> {
        let recipient = expected.recipient()?;
        let amount = expected.amount()?;
        let token = expected.token()?;

        let Some(chain) = self.chains.resolve(&expected.network_name) else {
            return Ok(PaymentVerification::rejected(
                tx_hash,
                PaymentRejection::UnsupportedNetwork(expected.network_name.clone()),
            ));
        };
        if chain.chain_id != expected.network_id {
            return Ok(PaymentVerification::rejected(
                tx_hash,
                PaymentRejection::UnsupportedNetwork(format!(
                    "{} is chain {}, not {}",
                    chain.name, chain.chain_id, expected.network_id
                )),
            ));
        }

        let Some(receipt) = chain.reader.transaction_receipt(tx_hash).await? else {
            return Ok(PaymentVerification::rejected(
                tx_hash,
                PaymentRejection::NotFoundOrPending,
            ));
        };

        if receipt.status != Some(1.into()) {
            return Ok(PaymentVerification::rejected(
                tx_hash,
                PaymentRejection::TransactionFailed,
            ));
        }

        let verification = match token {
            None => {
                let Some(tx) = chain.reader.transaction(tx_hash).await? else {
                    return Ok(PaymentVerification::rejected(
                        tx_hash,
                        PaymentRejection::NotFoundOrPending,
                    ));
                };

                if tx.to != Some(recipient) {
                    PaymentVerification::rejected(
                        tx_hash,
                        PaymentRejection::RecipientMismatch {
                            expected: format_address(&recipient),
                            actual: tx
                                .to
                                .map(|to| format_address(&to))
                                .unwrap_or_else(|| "contract creation".to_string()),
                        },
                    )
                } else if tx.value != amount {
                    PaymentVerification::rejected(
                        tx_hash,
                        PaymentRejection::AmountMismatch {
                            expected: amount.to_string(),
                            actual: tx.value.to_string(),
                        },
                    )
                } else {
                    PaymentVerification::accepted(tx_hash, tx.from, tx.value)
                }
            }
            Some(token) => Self::check_token_transfer(tx_hash, &receipt, token, recipient, amount),
        };

        if verification.verified {
            tracing::info!(
                tx_hash = ?tx_hash,
                network = %chain.name,
                symbol = %expected.token_symbol,
                amount = %amount,
                "Payment verified"
            );
        } else {
            tracing::info!(
                tx_hash = ?tx_hash,
                network = %chain.name,
                reason = ?verification.rejection,
                "Payment rejected"
            );
        }

        Ok(verification)
    }

    fn check_token_transfer(
        tx_hash: H256,
        receipt: &TransactionReceipt,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> PaymentVerification {
        let transfers = Self::parse_token_transfers(receipt, token);

        if let Some(transfer) = transfers
            .iter()
            .find(|t| t.to == recipient && t.amount == amount)
        {
            return PaymentVerification::accepted(tx_hash, transfer.from, transfer.amount);
        }

        let rejection = match (
            transfers.iter().find(|t| t.to == recipient),
            transfers.first(),
        ) {
            (_, None) => PaymentRejection::TransferEventNotFound {
                token: format_address(&token),
            },
            (Some(to_recipient), _) => PaymentRejection::AmountMismatch {
                expected: amount.to_string(),
                actual: to_recipient.amount.to_string(),
            },
            (None, Some(first)) => PaymentRejection::RecipientMismatch {
                expected: format_address(&recipient),
                actual: format_address(&first.to),
            },
        };

        PaymentVerification::rejected(tx_hash, rejection)
    }

    /// ERC20 `Transfer` logs emitted by `token`. ERC721 transfers index the
    /// token id as a fourth topic and are skipped.
    fn parse_token_transfers(receipt: &TransactionReceipt, token: Address) -> Vec<TokenTransfer> {
        let topic = transfer_topic();

        receipt
            .logs
            .iter()
            .filter(|log| {
                log.address == token
                    && log.topics.len() == 3
                    && log.topics[0] == topic
                    && log.data.len() >= 32
            })
            .map(|log| TokenTransfer {
                from: Address::from(log.topics[1]),
                to: Address::from(log.topics[2]),
                amount: U256::from_big_endian(&log.data[..32]),
            })
            .collect()
    }
}

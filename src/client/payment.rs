use crate::models::PaymentTerms;
use anyhow::{anyhow, bail, Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionRequest, H256},
};
use std::sync::Arc;

// ERC20 subset needed to pay a task in tokens
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

/// Sends the payment a task asks for from a local wallet.
pub struct PaymentClient {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl PaymentClient {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        let wallet = private_key
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);

        let provider = Arc::new(SignerMiddleware::new(provider, wallet));

        Ok(Self { provider })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    /// Sends exactly `terms.amount_base_units` to the recipient and waits for
    /// the receipt. Returns the transaction hash to submit for verification.
    pub async fn pay(&self, terms: &PaymentTerms) -> Result<H256> {
        let recipient = terms.recipient()?;
        let amount = terms.amount()?;

        tracing::info!("{}", terms.describe());

        let receipt = match terms.token()? {
            None => {
                let balance = self.provider.get_balance(self.address(), None).await?;
                if balance < amount {
                    bail!("Insufficient {} balance: {} < {}", terms.token_symbol, balance, amount);
                }

                let request = TransactionRequest::new().to(recipient).value(amount);
                self.provider
                    .send_transaction(request, None)
                    .await
                    .context("Failed to send payment")?
                    .await
                    .context("Failed to get transaction receipt")?
            }
            Some(token) => {
                let erc20 = IERC20::new(token, self.provider.clone());
                let balance = erc20.balance_of(self.address()).call().await?;
                if balance < amount {
                    bail!("Insufficient {} balance: {} < {}", terms.token_symbol, balance, amount);
                }

                let transfer = erc20.transfer(recipient, amount);
                let pending = transfer
                    .send()
                    .await
                    .context("Failed to send token transfer")?;
                pending
                    .await
                    .context("Failed to get transaction receipt")?
            }
        }
        .ok_or_else(|| anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            bail!("Transaction failed onchain");
        }

        tracing::info!("Payment confirmed: {:?}", receipt.transaction_hash);

        Ok(receipt.transaction_hash)
    }
}

use airdrop_verifier::{
    client::{PaymentClient, VerifierApi},
    models::{format_address, network::rpc_env_var, VerifyPaymentRequest},
};
use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let base_url = std::env::var("VERIFIER_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let private_key = std::env::var("PAYER_PRIVATE_KEY").context("PAYER_PRIVATE_KEY required")?;
    let campaign_id: u64 = std::env::var("CAMPAIGN_ID")
        .context("CAMPAIGN_ID required")?
        .parse()
        .context("Invalid CAMPAIGN_ID")?;
    let task_index: u32 = std::env::var("TASK_INDEX")
        .context("TASK_INDEX required")?
        .parse()
        .context("Invalid TASK_INDEX")?;

    let payer = format_address(&private_key.parse::<LocalWallet>()?.address());
    let api = VerifierApi::new(&base_url);

    println!("Airdrop Payer");
    println!("=============");
    println!("Verifier: {}", base_url);
    println!("Task: campaign {} / task {}", campaign_id, task_index);
    println!("Payer: {}", payer);
    println!();

    println!("Step 1: Fetching payment terms...");
    let status = api.check_payment(campaign_id, task_index, &payer).await?;

    if status.verified {
        println!(
            "   [OK] Already verified with {}",
            status.transaction_hash.unwrap_or_default()
        );
        return Ok(());
    }

    let terms = status.payment.terms;
    println!("   {}", status.payment.description);
    println!();

    println!("Step 2: Sending payment on {}...", terms.network_name);
    let rpc_var = rpc_env_var(&terms.network_name);
    let rpc_url = std::env::var(&rpc_var).with_context(|| format!("{} required", rpc_var))?;
    let client = PaymentClient::new(&rpc_url, &private_key, terms.network_id)?;
    let tx_hash = client.pay(&terms).await?;
    println!("   [OK] Payment sent: {:?}", tx_hash);
    println!();

    println!("Step 3: Submitting transaction for verification...");
    let result = api
        .verify_payment(&VerifyPaymentRequest {
            campaign_id,
            task_index,
            transaction_hash: format!("{:?}", tx_hash),
            user_address: payer,
        })
        .await?;

    if result.verified {
        println!("   [SUCCESS] Payment verified");
    } else {
        println!(
            "   [FAILED] {} ({})",
            result.error.unwrap_or_default(),
            result.error_code.unwrap_or_default()
        );
    }

    Ok(())
}

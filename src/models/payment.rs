use crate::error::AirdropError;
use crate::models::network::chain_id_for;
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a participant must send to complete a paid task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    pub recipient_address: String,
    /// Integer amount in the token's smallest unit (wei for native coin).
    pub amount_base_units: String,
    /// `None`, empty or the zero address means the network's native coin.
    #[serde(default)]
    pub token_address: Option<String>,
    pub token_symbol: String,
    pub network_id: u64,
    pub network_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u32>,
}

impl PaymentTerms {
    pub fn recipient(&self) -> Result<Address, AirdropError> {
        parse_address(&self.recipient_address).ok_or_else(|| {
            AirdropError::InvalidRequest(format!(
                "Invalid recipient address: {}",
                self.recipient_address
            ))
        })
    }

    pub fn amount(&self) -> Result<U256, AirdropError> {
        let trimmed = self.amount_base_units.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AirdropError::InvalidRequest(format!(
                "Invalid amount: {}",
                self.amount_base_units
            )));
        }
        U256::from_dec_str(trimmed).map_err(|e| {
            AirdropError::InvalidRequest(format!("Invalid amount {}: {}", self.amount_base_units, e))
        })
    }

    /// The ERC20 contract to watch, or `None` for a native-coin payment.
    pub fn token(&self) -> Result<Option<Address>, AirdropError> {
        let Some(raw) = self.token_address.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let token = parse_address(raw)
            .ok_or_else(|| AirdropError::InvalidRequest(format!("Invalid token address: {}", raw)))?;
        Ok((!token.is_zero()).then_some(token))
    }

    /// Checks that every field parses, so a stored task can always be verified against.
    pub fn validate(&self) -> Result<(), AirdropError> {
        self.recipient()?;
        self.amount()?;
        self.token()?;

        match chain_id_for(&self.network_name) {
            Some(id) if id == self.network_id => Ok(()),
            Some(id) => Err(AirdropError::InvalidRequest(format!(
                "Network {} has chain id {}, not {}",
                self.network_name, id, self.network_id
            ))),
            None => Err(AirdropError::InvalidRequest(format!(
                "Unsupported network: {}",
                self.network_name
            ))),
        }
    }

    /// "Send 0.5 ETH to 0xabc… on sepolia"
    pub fn describe(&self) -> String {
        let decimals = self.token_decimals.unwrap_or(18);
        let amount = self
            .amount()
            .ok()
            .and_then(|amount| format_units(amount, decimals).ok())
            .map(|formatted| trim_fraction(&formatted))
            .unwrap_or_else(|| format!("{} base units of", self.amount_base_units));

        format!(
            "Send {} {} to {} on {}",
            amount,
            self.token_symbol,
            self.recipient_address.to_lowercase(),
            self.network_name
        )
    }
}

pub fn parse_address(raw: &str) -> Option<Address> {
    Address::from_str(raw.trim()).ok()
}

/// Full lowercase `0x…` form; `Display` on ethers addresses abbreviates.
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}

fn trim_fraction(formatted: &str) -> String {
    if !formatted.contains('.') {
        return formatted.to_string();
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sepolia_eth(amount: &str) -> PaymentTerms {
        PaymentTerms {
            recipient_address: "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            amount_base_units: amount.to_string(),
            token_address: None,
            token_symbol: "ETH".to_string(),
            network_id: 11_155_111,
            network_name: "sepolia".to_string(),
            token_decimals: None,
        }
    }

    #[test]
    fn zero_token_address_is_native() {
        let mut terms = sepolia_eth("1");
        assert_eq!(terms.token().unwrap(), None);

        terms.token_address = Some("0x0000000000000000000000000000000000000000".into());
        assert_eq!(terms.token().unwrap(), None);

        terms.token_address = Some(String::new());
        assert_eq!(terms.token().unwrap(), None);

        terms.token_address = Some("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".into());
        assert!(terms.token().unwrap().is_some());

        terms.token_address = Some("0x1234".into());
        assert!(terms.token().is_err());
    }

    #[test]
    fn amount_must_be_a_plain_integer() {
        assert_eq!(
            sepolia_eth("1000000000000000000").amount().unwrap(),
            U256::exp10(18)
        );
        assert!(sepolia_eth("1.5").amount().is_err());
        assert!(sepolia_eth("-1").amount().is_err());
        assert!(sepolia_eth("").amount().is_err());
    }

    #[test]
    fn validate_checks_chain_id() {
        assert!(sepolia_eth("1").validate().is_ok());

        let mut terms = sepolia_eth("1");
        terms.network_id = 1;
        assert!(terms.validate().is_err());

        terms.network_name = "goerli".into();
        assert!(terms.validate().is_err());
    }

    #[test]
    fn describe_uses_human_units() {
        assert_eq!(
            sepolia_eth("1500000000000000000").describe(),
            "Send 1.5 ETH to 0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa on sepolia"
        );

        let mut usdc = sepolia_eth("2000000");
        usdc.token_symbol = "USDC".into();
        usdc.token_decimals = Some(6);
        assert!(usdc.describe().starts_with("Send 2 USDC"));
    }
}

use serde::{Deserialize, Serialize};

/// Networks the verifier knows how to reach, by name and EIP-155 chain id.
pub const SUPPORTED_NETWORKS: &[(&str, u64)] = &[
    ("mainnet", 1),
    ("sepolia", 11_155_111),
    ("base", 8453),
    ("base-sepolia", 84_532),
    ("polygon", 137),
    ("polygon-amoy", 80_002),
    ("arbitrum", 42_161),
    ("arbitrum-sepolia", 421_614),
    ("optimism", 10),
    ("optimism-sepolia", 11_155_420),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
}

pub fn chain_id_for(name: &str) -> Option<u64> {
    let name = normalize_network_name(name);
    SUPPORTED_NETWORKS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, id)| *id)
}

/// Lowercases and folds `_`/space to `-`, so "Base Sepolia" resolves as "base-sepolia".
pub fn normalize_network_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['_', ' '], "-")
}

/// `base-sepolia` -> `RPC_URL_BASE_SEPOLIA`
pub fn rpc_env_var(name: &str) -> String {
    format!("RPC_URL_{}", name.to_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_loosely() {
        assert_eq!(chain_id_for("Sepolia"), Some(11_155_111));
        assert_eq!(chain_id_for("base_sepolia"), Some(84_532));
        assert_eq!(chain_id_for("Base Sepolia"), Some(84_532));
        assert_eq!(chain_id_for("goerli"), None);
    }

    #[test]
    fn env_var_names() {
        assert_eq!(rpc_env_var("sepolia"), "RPC_URL_SEPOLIA");
        assert_eq!(rpc_env_var("polygon-amoy"), "RPC_URL_POLYGON_AMOY");
    }
}

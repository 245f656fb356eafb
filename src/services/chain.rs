use crate::error::{AirdropError, Result};
use crate::models::network::normalize_network_name;
use crate::models::NetworkConfig;
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Transaction, TransactionReceipt, H256},
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Read-only access to one chain, the part of a JSON-RPC node the verifier needs.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;

    async fn transaction(&self, hash: H256) -> Result<Option<Transaction>>;
}

pub struct EvmChainReader {
    network: String,
    provider: Provider<Http>,
    timeout: Duration,
}

impl EvmChainReader {
    pub fn new(network: &str, rpc_url: &str, timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| AirdropError::RpcError {
            network: network.to_string(),
            message: format!("invalid RPC url: {}", e),
        })?;

        Ok(Self {
            network: network.to_string(),
            provider,
            timeout,
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AirdropError::RpcError {
                network: self.network.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(AirdropError::RpcTimeout {
                network: self.network.clone(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ChainReader for EvmChainReader {
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.bounded(self.provider.get_transaction_receipt(hash)).await
    }

    async fn transaction(&self, hash: H256) -> Result<Option<Transaction>> {
        self.bounded(self.provider.get_transaction(hash)).await
    }
}

#[derive(Clone)]
pub struct ChainHandle {
    pub name: String,
    pub chain_id: u64,
    pub reader: Arc<dyn ChainReader>,
}

/// Chain readers by normalized network name.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, ChainHandle>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_networks(networks: &[NetworkConfig], timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for network in networks {
            let reader = EvmChainReader::new(&network.name, &network.rpc_url, timeout)?;
            registry.insert(&network.name, network.chain_id, Arc::new(reader));
            tracing::info!(
                network = %network.name,
                chain_id = network.chain_id,
                "Chain reader configured"
            );
        }
        Ok(registry)
    }

    pub fn insert(&mut self, name: &str, chain_id: u64, reader: Arc<dyn ChainReader>) {
        let name = normalize_network_name(name);
        self.chains.insert(
            name.clone(),
            ChainHandle {
                name,
                chain_id,
                reader,
            },
        );
    }

    pub fn with_chain(mut self, name: &str, chain_id: u64, reader: Arc<dyn ChainReader>) -> Self {
        self.insert(name, chain_id, reader);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&ChainHandle> {
        self.chains.get(&normalize_network_name(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }
}

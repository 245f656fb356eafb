pub mod chain;
pub mod store;
pub mod tasks;
pub mod verifications;
pub mod verifier;

pub use chain::{ChainHandle, ChainReader, ChainRegistry, EvmChainReader};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use tasks::TaskMetadataStore;
pub use verifications::{format_tx_hash, RecordOutcome, VerificationCache};
pub use verifier::{PaymentVerification, PaymentVerifier};

pub mod network;
pub mod payment;
pub mod response;
pub mod task;
pub mod verification;

pub use network::NetworkConfig;
pub use payment::*;
pub use response::*;
pub use task::*;
pub use verification::*;

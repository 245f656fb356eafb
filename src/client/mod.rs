pub mod api;
pub mod payment;

pub use api::VerifierApi;
pub use payment::PaymentClient;

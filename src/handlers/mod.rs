pub mod health;
pub mod payment;
pub mod tasks;

pub use health::*;
pub use payment::*;
pub use tasks::*;

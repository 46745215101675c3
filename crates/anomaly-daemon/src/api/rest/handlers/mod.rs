//! API request handlers

mod anomalies;
mod batches;
mod health;

pub use anomalies::*;
pub use batches::*;
pub use health::*;

pub mod domain;
pub mod nats;
pub mod target_worker;

pub use domain::*;
pub use target_worker::*;

mod client;
mod headers;
mod middleware;
mod tower_consumer;
mod traits;

pub use client::*;
pub use headers::*;
pub use middleware::*;
pub use tower_consumer::*;
pub use traits::*;

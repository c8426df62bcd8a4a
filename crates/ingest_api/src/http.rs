mod error;
mod handlers;
mod router;
mod server;

pub use error::*;
pub use handlers::*;
pub use router::*;
pub use server::*;

mod document;
mod feature;
mod message;
mod pipeline;
mod result;
mod target;

pub use document::*;
pub use feature::*;
pub use message::*;
pub use pipeline::*;
pub use result::*;
pub use target::*;

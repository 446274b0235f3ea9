pub mod api;
pub mod transfer;

pub use api::*;
pub use transfer::*;

pub mod claim;
pub mod health;
pub mod sponsor;
pub mod transfer;

pub use claim::*;
pub use health::*;
pub use sponsor::*;
pub use transfer::*;

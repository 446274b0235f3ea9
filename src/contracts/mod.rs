pub mod usdc;

pub use usdc::{IERC20, TRANSFER_EVENT_TOPIC};

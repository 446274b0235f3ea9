pub mod chain;
pub mod claim_lock;
pub mod email;
pub mod store;
pub mod transfers;

pub use chain::{EvmSponsorChain, PayoutStatus, SponsorChain};
pub use claim_lock::{ClaimLock, LockLease};
pub use email::{EmailMessage, LogMailer, Mailer, ResendMailer};
pub use store::{MemoryTransferStore, PgTransferStore, TransferStore};
pub use transfers::{TransferService, TransferSettings};

//! Secret distribution to remote stores.

pub mod distributor;
pub mod filter;
pub mod ledger;
pub mod report;
pub mod target;
pub mod traits;

pub use distributor::{SecretDistributor, TargetBinding};
pub use filter::KeyFilter;
pub use ledger::{DistributionDocument, DistributionLedger};
pub use report::{DistributionReport, TargetReport};
pub use target::{Delivery, DistributionTarget, TargetKind, TargetScope};
pub use traits::{Encryptor, PublicKeySource, SecretStoreClient};

pub mod bet;
pub mod error;
pub mod ids;
pub mod matches;
pub mod outbox;
pub mod transaction;
pub mod wallet;

pub use bet::*;
pub use error::*;
pub use matches::*;
pub use outbox::*;
pub use transaction::*;
pub use wallet::*;

pub mod betting;
pub mod clock;
pub mod metrics;
pub mod notifier;
pub mod settlement;
pub mod wallet;

pub use betting::*;
pub use clock::*;
pub use metrics::*;
pub use notifier::*;
pub use settlement::*;
pub use wallet::*;

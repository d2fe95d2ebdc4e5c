pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod errors;
pub mod events;
pub mod feed;
pub mod gate;
pub mod models;
pub mod runtime;
pub mod session;
pub mod store;
pub mod tracing_setup;

// Re-export the main entry points at crate root for convenience
pub use errors::ChatError;
pub use gate::{AccessGate, GateMode, TransactionOracle};
pub use runtime::CoreRuntime;
pub use session::{ConversationSession, SendReceipt};

pub mod identity;
pub mod message;
pub mod thread;

pub use identity::{Identity, Profile};
pub use message::{Message, OptimisticMessage};
pub use thread::{MessagePreview, Participant, Thread, ThreadSummary};

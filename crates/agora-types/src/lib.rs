pub mod api;
pub mod events;
pub mod models;
pub mod paths;

pub use events::{FaultKind, Snapshot, StoreEvent, StoreFault};
pub use models::{Article, Comment, Conversation, Keyed, Message, UserProfile};

//! Client-side synchronization between screens and the realtime tree store.
//!
//! - `RemoteCollection` / `RemoteDocument`: live, decoded views of store paths
//! - `IdentityResolver`: memoized `userId -> username` lookups
//! - `OptimisticMutator`: local-first writes with explicit failure policy
//! - `compose`: pure functions from snapshots to render-ready lists
//! - `ScreenScope`: ties every subscription to a screen's lifetime

pub mod clock;
pub mod collection;
pub mod compose;
pub mod document;
pub mod error;
pub mod mutator;
pub mod resolver;
pub mod retry;
pub mod scope;

mod live;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collection::{CollectionSnapshot, RemoteCollection, decode_record};
pub use document::{DocumentSnapshot, RemoteDocument, fetch_once, fetch_record};
pub use error::SyncError;
pub use live::Subscription;
pub use mutator::{
    BlindCounter, CounterStrategy, LikeCounter, LikePolicy, Mutation, OptimisticMutator, Settled,
    TransactionalCounter, WriteFailurePolicy,
};
pub use resolver::{IdentityResolver, NameLookup, UNKNOWN_USER};
pub use retry::RetryPolicy;
pub use scope::ScreenScope;

//! Cached reads and invalidating writes over `ApiService`.
//!
//! # Design
//! - `QueryCache` is a process-wide, cloneable handle; every clone shares
//!   the same entries.
//! - Reads are `Query` bindings: a key plus a fetcher. Concurrent reads of
//!   one key share a single in-flight fetch.
//! - Writes are `Mutation` bindings that declare the key prefixes they make
//!   stale. Invalidation happens only after the write succeeds.
//! - `WorkflowQueries` is the catalogue of engine resources, each bound to a
//!   stable key from `keys`.

mod binding;
mod cache;
mod key;
mod mutation;
mod workflow;

pub use binding::{fetcher, typed_fetcher, Query, QueryOptions, QueryState};
pub use cache::{EntrySnapshot, FetchPolicy, FetchResult, Fetcher, Observer, QueryCache};
pub use key::{keys, KeySegment, QueryKey};
pub use mutation::{Mutation, MutationState};
pub use workflow::WorkflowQueries;

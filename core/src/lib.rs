//! Client data-access layer for the SpiffWorkflow backend.
//!
//! # Overview
//! `ApiService` turns a path plus `ApiOptions` into an authenticated HTTP
//! call, classifies the response into data or an `ApiError`, and runs the
//! sign-in / sign-out redirects the UI expects. The `query` module layers a
//! shared cache on top: keyed reads with deduplication and staleness, and
//! writes that invalidate the reads they affect.
//!
//! # Design
//! - Request preparation and response interpretation are pure functions over
//!   `HttpRequest` / `HttpResponse` values; the `Transport` trait is the only
//!   I/O boundary. Hosts may also drive the round-trip themselves via
//!   `ApiService::build_request` and `ApiService::parse_response`.
//! - Session state (`AuthContext`) and navigation (`Navigator`) are injected
//!   and only read or invoked, never owned.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod navigation;
pub mod query;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;
pub mod url;

pub use auth::{AuthContext, SessionAuth};
pub use client::ApiService;
pub use config::{CacheConfig, ClientConfig, ConfigError};
pub use error::ApiError;
pub use http::{Body, CacheMode, FormData, HttpMethod, HttpRequest, HttpResponse};
pub use navigation::{HistoryNavigator, Navigator};
pub use query::{
    keys, Mutation, MutationState, Query, QueryCache, QueryKey, QueryOptions, QueryState,
    WorkflowQueries,
};
pub use request::ApiOptions;
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{CompleteTask, Page, Pagination, ProcessGroup, ProcessInstance, ProcessModel, Task};
pub use url::QueryValue;

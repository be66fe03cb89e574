//! Client-side core for the GeoQB spatial knowledge-graph service: a typed API
//! client, a keyed query cache with mutation-driven invalidation, the layer
//! lifecycle tracker and the view models built on top of them.

pub mod api;
pub mod cache;
pub mod error;
pub mod forms;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod views;

pub use api::{ApiClient, ApiConfig, ApiResult, GeoApi};
pub use cache::{CacheSubscription, KeyScope, Mutation, QueryCache, QueryKey};
pub use error::{ClientError, ErrorDisposition, FieldError, FormErrors};
pub use lifecycle::{LayerWatcher, WatchOptions, WatchOutcome};
pub use session::{AccessToken, Session};
pub use store::Store;

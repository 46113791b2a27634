//! staysearch runtime: model resolution and tool-augmented queries.
//!
//! A free-text lodging request flows through four stages:
//!
//! - **Catalog**: probe the local Ollama daemon for installed models. An
//!   unreachable daemon is just an empty catalog.
//! - **Selection**: pick one [`BackendDescriptor`] from the requested model,
//!   the catalog and whether a remote credential exists.
//! - **Invocation**: launch the lodging-search MCP server, let the model call
//!   it as often as it likes, then tear the server down.
//! - **Normalization**: render whatever came back as one display string.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{Config, QueryRequest, QueryService};
//!
//! # async fn example() {
//! let config = Config::default().apply_env(|key| std::env::var(key).ok());
//! let service = QueryService::from_config(&config);
//!
//! let result = service
//!     .query(&QueryRequest::new("2-bedroom apartment in Paris, Aug 1-15, under $100/night"))
//!     .await;
//! println!("{}", result.display_text);
//! # }
//! ```

pub mod catalog;
pub mod config;
mod error;
mod invoke;
pub mod model;
mod normalize;
pub mod select;
mod service;
pub mod tools;

pub use catalog::{CatalogCache, CatalogProbe, ModelCatalog, OllamaProber};
pub use config::{Config, ConfigError};
pub use error::{ErrorKind, InvocationError};
pub use invoke::{InvokeOptions, Invoker, QueryRequest, RawResult};
pub use normalize::{NO_RESULTS, QueryResult, normalize};
pub use select::{BackendDescriptor, Provider, Selector};
pub use service::QueryService;

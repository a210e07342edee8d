//! # Chart Repository Server
//!
//! Serves Helm chart repositories out of pluggable object storage.
//!
//! ## Architecture
//!
//! - **[`router`]**: matches request paths whose repository segment spans a
//!   configurable number of path segments, strips an optional context path and
//!   records low-cardinality metrics labels
//! - **[`index`]**: builds `index.yaml` from storage listings and caches it per
//!   repository; concurrent rebuilds collapse into a single storage scan
//! - **[`server`]**: route table, handlers and the serve loop
//! - **[`config`]**, **[`cli`]**, **[`logging`]**, **[`metrics`]**: ambient plumbing
//!
//! ## Routes
//!
//! | Method | Path                               | Purpose                    |
//! |--------|------------------------------------|----------------------------|
//! | GET    | `/:repo/index.yaml`                | Repository index           |
//! | GET    | `/:repo/charts/:filename`          | Package or provenance file |
//! | GET    | `/api/:repo/charts[/:name[/:ver]]` | JSON chart listings        |
//! | POST   | `/api/:repo/charts`                | Multipart upload           |
//! | DELETE | `/api/:repo/charts/:name/:version` | Remove a chart version     |
//! | GET    | `/health`, `/metrics`              | Operational endpoints      |

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod server;
pub mod state;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use index::{IndexCache, IndexError, IndexRegistry, RepositoryIndex};
pub use router::{Classification, Handler, Route, RouteContext, Router, RouterConfig};
pub use server::{app, generate_index, prime_indexes, run_server};
pub use state::AppState;

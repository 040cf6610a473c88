//! # Questionnaire Flow
//!
//! Client-side state and navigation engine for multi-step questionnaires
//! whose branching is decided by a remote evaluation service.
//!
//! ## Features
//!
//! - **Flow Store**: single authoritative traversal state with a strict
//!   phase machine and generation-guarded response merging
//! - **Evaluation Client**: typed HTTP JSON client covering both the
//!   tree-walk and the module/parameter service contracts
//! - **Persistence**: durable answer and session storage so a restart
//!   resumes instead of starting over
//! - **Local navigation**: purely client-side next-step lookup for flows
//!   shipped as a full question tree
//!
//! ## Architecture
//!
//! ```text
//! View layer → FlowStore → EvaluationClient (HTTP)
//!                  ↓
//!            Persistence (SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use questionnaire_flow::{Config, FlowStore};
//! use questionnaire_flow::persistence::SqlitePersistence;
//! use questionnaire_flow::service::EvaluationClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let persistence = Arc::new(SqlitePersistence::new(&config.storage).await?);
//!     let client = EvaluationClient::new(&config.service, config.request.clone())?;
//!     let store = FlowStore::new(client, persistence).await;
//!     let module = store.initialize().await?;
//!     println!("First module: {}", module.title);
//!     Ok(())
//! }
//! ```

/// Configuration management loaded from the environment.
pub mod config;
/// Error types and result aliases for every layer.
pub mod error;
/// Data contracts shared between store and service client.
pub mod model;
/// Durable key-value persistence for answers and session identity.
pub mod persistence;
/// Evaluation service HTTP client and wire types.
pub mod service;
/// The flow store: traversal state, navigation, and merging.
pub mod store;

pub use config::Config;
pub use error::{FlowError, FlowResult, PersistenceError, ServiceError};
pub use store::{FlowPhase, FlowStore, Node, SessionInfo};

//! Anomalo provider
//!
//! Manages Anomalo data-quality configuration declaratively: table
//! monitoring settings (`anomalo_table`), checks (`anomalo_check`) and
//! lookups of notification channels (`anomalo_notification_channel`).
//!
//! # Overview
//!
//! - **[`ProviderService`]**: the operations a declarative-infrastructure
//!   host drives (schema, configure, validate, plan, CRUD, import, data
//!   sources), implemented by [`AnomaloProvider`]
//! - **Check reconciliation** ([`check`]): Anomalo cannot update a check in
//!   place, so updates are replaces that send the old `check_static_id`
//!   and record the new one; the host still sees one resource
//! - **Schema-driven validation and planning** ([`validation`], [`plan`])
//! - **HTTP client** ([`client`]) for the Anomalo public API, behind the
//!   [`api::AnomaloApi`] trait so tests can use [`testing::FakeAnomalo`]
//! - **Logging** through `tracing`, written to stderr
//!
//! # Quick Start
//!
//! ```no_run
//! use anomalo_provider::{init_logging, AnomaloProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = AnomaloProvider::new();
//!     let diagnostics = provider
//!         .configure(json!({
//!             "host": "https://anomalo.example.com",
//!             "token": "my-api-token",
//!         }))
//!         .await?;
//!     assert!(diagnostics.is_empty());
//!
//!     let plan = provider
//!         .plan(
//!             "anomalo_check",
//!             None,
//!             json!({"table_id": 12, "check_type": "NullCheck", "params": {"column": "id"}}),
//!             json!({"table_id": 12, "check_type": "NullCheck", "params": {"column": "id"}}),
//!         )
//!         .await?;
//!     let applied = provider.create("anomalo_check", plan.planned_state).await?;
//!     tracing::info!(state = %applied.state, "created");
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! The provider block accepts `host`, `token`, `organization` and
//! `request_timeout_secs`. `host` and `token` fall back to
//! `ANOMALO_INSTANCE_HOST` and `ANOMALO_API_SECRET_TOKEN`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod check;
pub mod client;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod notification_channel;
pub mod params;
pub mod plan;
pub mod provider;
pub mod schema;
pub mod table;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use api::{AnomaloApi, CheckApi};
pub use check::{Check, CheckOutcome, CheckReconciler};
pub use client::AnomaloClient;
pub use config::{ClientSettings, ProviderConfig};
pub use error::ProviderError;
pub use import::{CheckIdentity, CheckImportId};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{AnomaloProvider, ProviderService};
pub use schema::{Diagnostic, ProviderSchema};
pub use table::{Table, TableReconciler};
pub use types::{ApplyResult, AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command line / environment overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → cloned into each subsystem at startup
//!
//! Template hot reload (optional):
//!     watcher.rs detects ike.conf / childsa.conf change
//!     → Overlay::reload (templates, then topology)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults so the agent runs without a config file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AgentConfig;
pub use schema::ArpConfig;
pub use schema::ControlConfig;
pub use schema::MetadataConfig;
pub use schema::MonitorConfig;
pub use schema::ObservabilityConfig;
pub use schema::TemplatesConfig;

//! Base tunnel configuration templates.
//!
//! # Responsibilities
//! - Load `ike.conf` and `childsa.conf` from the template directory
//! - Fall back to built-in defaults for absent files
//! - Validate both documents and fingerprint them for the config builder

pub mod manager;
pub mod schema;

pub use manager::{TemplateError, TemplateManager, TemplateResult};
pub use schema::{AuthConf, ChildSaConf, IkeConf};

pub const IKE_CONF_NAME: &str = "ike.conf";
pub const CHILD_SA_CONF_NAME: &str = "childsa.conf";

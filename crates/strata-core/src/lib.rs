//! Strata core primitives
//!
//! Shared building blocks for the Strata trust layer: the unified
//! [`SecurityError`] type, the security configuration model consumed at
//! server startup, and wall-clock helpers used for capability and
//! credential expiry.

pub mod config;
pub mod errors;
pub mod time;

pub use config::{
    LdapConfig, LdapSearchMode, LdapSearchScope, MappingRuleConfig, SecurityConfig,
    SignatureScheme,
};
pub use errors::{Result, SecurityError};
pub use time::unix_now;

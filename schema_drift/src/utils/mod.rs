//! Utilities for SchemaDrift

pub mod logging;
pub mod naming;

pub use logging::init_logging;
pub use naming::{canonical_action, is_implicit_not_null, normalize_identifier};

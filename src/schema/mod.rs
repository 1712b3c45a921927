mod base;

pub use base::CREATE_SCHEMA_SQL;

/// Version written by `CREATE_SCHEMA_SQL`. Bump alongside an upgrade script.
pub const SCHEMA_VERSION: &str = "1";

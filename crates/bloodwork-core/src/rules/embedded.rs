//! Rule catalog shipped inside the library.

/// Default rule catalog JSON, embedded at compile time.
pub static DEFAULT_CATALOG: &str = include_str!("../../rules/default.json");

use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs sort by creation time, so ids generated by one process order the
/// same way as the events they name.
///
/// # Examples
/// ```
/// let id = talknest_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CONNECTION: &str = "conn";
    pub const MESSAGE: &str = "msg";
    pub const CONVERSATION: &str = "cnv";
}

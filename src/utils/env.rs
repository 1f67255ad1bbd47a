/// Get environment variable with CAMPUS_ prefix, falling back to unprefixed version
///
/// Checks `CAMPUS_{key}` first, then `{key}`, so deployments can use either the
/// namespaced form or the platform's conventional names (`PORT`, `DATABASE_URL`).
///
/// # Examples
///
/// ```rust,ignore
/// // Checks CAMPUS_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("CAMPUS_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse an environment variable (prefixed or not) into `T`, ignoring unparsable values.
pub fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|v| v.trim().parse().ok())
}

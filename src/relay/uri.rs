//! Agent URI helpers.

/// Agent part of an agent key: the last non-empty `/`-separated segment.
///
/// `"oef://core-1/agents/weather"` → `"weather"`, `"weather"` → `"weather"`.
pub fn agent_part(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

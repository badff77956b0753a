pub mod emulate;
pub mod health;
pub mod serve;
pub mod status;
pub mod steps;

/// Base URL of a locally running `nwwatch serve` with default flags.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8000";

/// Join `base` and an absolute route without doubling the slash.
pub fn endpoint(base: &str, route: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), route)
}

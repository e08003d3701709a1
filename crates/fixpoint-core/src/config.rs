//! Environment-variable configuration
//!
//! Small, read-on-demand knobs. Everything here has a sane default so the
//! engine runs with no configuration at all.
//!
//! | Variable                      | Effect                                  |
//! |-------------------------------|-----------------------------------------|
//! | `FIXPOINT_DB`                 | Alternative memory database path        |
//! | `FIXPOINT_DISABLE_EMBEDDINGS` | Force text-only search                  |
//! | `FIXPOINT_LOG`                | Log filter (falls back to `RUST_LOG`)   |

use std::path::PathBuf;

/// Alternative database location, if configured
pub fn database_path_override() -> Option<PathBuf> {
    std::env::var_os("FIXPOINT_DB").map(PathBuf::from)
}

/// Whether the embedder is disabled at runtime
///
/// Any non-empty value other than `0` or `false` disables embeddings,
/// regardless of compiled features.
pub fn embeddings_disabled() -> bool {
    match std::env::var("FIXPOINT_DISABLE_EMBEDDINGS") {
        Ok(v) => !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"),
        Err(_) => false,
    }
}

/// Log filter directive for the tracing subscriber
pub fn log_filter() -> Option<String> {
    std::env::var("FIXPOINT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
}

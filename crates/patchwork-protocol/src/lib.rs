//! Wire vocabulary shared by the patchwork server and the browser runtime.
//!
//! Fragment exchanges are described entirely through HTTP headers: the request
//! carries a marker, the response carries an ordered manifest of
//! `(target, strategy)` pairs next to a body of concatenated HTML fragments.

pub mod headers;
mod manifest;

pub use manifest::{ManifestEntry, ManifestError, SwapManifest, SwapStrategy, UnknownStrategy};

/// Interpret a boolean-as-string header value.
///
/// Servers built on other stacks have been seen to emit `True`, so matching is
/// case-insensitive and `1` is accepted as well.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

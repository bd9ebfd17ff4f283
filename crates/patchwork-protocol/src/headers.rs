//! Canonical header, cookie, attribute and signal names.

/// Request marker: the exchange expects fragments, not a document.
pub const REQUEST: &str = "patch-request";

/// Request marker: a navigational request issued by the trigger engine.
pub const BOOSTED: &str = "patch-boosted";

/// Response header holding the JSON swap manifest.
pub const MERGE: &str = "patch-merge";

/// Response flag: keep the live value of a focused input inside a morphed subtree.
pub const MORPH_IGNORE_ACTIVE: &str = "patch-morph-ignore-active";

/// Response header naming a URL the client must navigate to instead of merging.
pub const REDIRECT: &str = "patch-redirect";

/// Request header mirroring the antiforgery cookie.
pub const CSRF_HEADER: &str = "patch-csrf-token";

/// Cookie carrying the antiforgery token.
pub const CSRF_COOKIE: &str = "patchwork-csrf";

/// Query parameter used to ask for an error page with a given status.
pub const ERROR_CODE_PARAM: &str = "code";

/// DOM attributes read by the trigger engine.
pub mod attr {
    pub const ACTION: &str = "patch-action";
    pub const METHOD: &str = "patch-method";
    pub const TRIGGER: &str = "patch-trigger";
    pub const IGNORE: &str = "patch-ignore";
    pub const BOOST: &str = "patch-boost";
    /// Id of an element the whole response is merged into, bypassing the manifest.
    pub const TARGET: &str = "patch-target";
    /// Strategy used with `patch-target`; `replace` when absent.
    pub const SWAP: &str = "patch-swap";
}

/// Prefix of every `CustomEvent` dispatched by the browser runtime.
pub const SIGNAL_PREFIX: &str = "patch:";

//! Lifecycle signals announced to the page as `patch:<stage>` events.

use std::fmt;

use patchwork_protocol::headers::SIGNAL_PREFIX;

/// A point in an element's lifecycle where listeners may observe or veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// An element is about to be armed; cancelling leaves it inert.
    Init,
    Inited,
    /// Listeners may rewrite the outgoing request.
    Config,
    Before,
    /// The response is in and the merge decision has been made.
    After,
    Error,
    Finally,
    Merged,
    /// Ask the runtime to scan a subtree for trigger-bearing elements.
    Process,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Inited => "inited",
            Stage::Config => "config",
            Stage::Before => "before",
            Stage::After => "after",
            Stage::Error => "error",
            Stage::Finally => "finally",
            Stage::Merged => "merged",
            Stage::Process => "process",
        }
    }

    pub fn event_name(self) -> String {
        format!("{SIGNAL_PREFIX}{}", self.as_str())
    }

    pub const fn bubbles(self) -> bool {
        !matches!(self, Stage::Inited)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

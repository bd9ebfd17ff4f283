//! Merge decisions: what a response means for the live page.
//!
//! [`assess`] turns status and protocol headers into an [`Outcome`] before
//! anything touches the DOM. An explicit target on the request overrides the
//! manifest. [`plan_fragments`] pairs the top-level elements
//! of a fragment body with manifest entries by identifier.

use std::fmt;

use patchwork_protocol::{SwapManifest, SwapStrategy, headers as wire, parse_flag};
use tracing::{error, warn};

use crate::descriptor::{MergeTarget, Method, RequestDescriptor};

/// Status, protocol headers and body text of a settled exchange.
#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub text: String,
}

impl ResponseSnapshot {
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            text: text.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoContent,
    /// A successful DELETE; the caller removes the element itself.
    Deleted,
    Redirection(u16),
    ClientError(u16),
    ServerError(u16),
    MissingManifest,
    MalformedManifest(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoContent => f.write_str("no content"),
            SkipReason::Deleted => f.write_str("delete acknowledged"),
            SkipReason::Redirection(status) => write!(f, "transport redirect ({status})"),
            SkipReason::ClientError(status) => write!(f, "client error ({status})"),
            SkipReason::ServerError(status) => write!(f, "server error ({status})"),
            SkipReason::MissingManifest => f.write_str("no merge manifest"),
            SkipReason::MalformedManifest(reason) => write!(f, "malformed manifest: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    Fragments {
        manifest: SwapManifest,
        ignore_active_value: bool,
    },
    /// The whole body goes into one element the request named.
    Target {
        target: MergeTarget,
        ignore_active_value: bool,
    },
    /// A boosted navigation answered with a whole document.
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Redirect(String),
    Skip(SkipReason),
    Merge(MergePlan),
}

/// Decide what to do with a response. The redirect header always wins.
pub fn assess(request: &RequestDescriptor, response: &ResponseSnapshot) -> Outcome {
    if let Some(location) = response
        .header(wire::REDIRECT)
        .map(str::trim)
        .filter(|location| !location.is_empty())
    {
        return Outcome::Redirect(location.to_string());
    }

    let status = response.status;
    match status {
        300..=399 => {
            warn!(
                target = "patchwork::client::reconcile",
                status,
                "transport redirect on a fragment exchange; send the redirect header instead"
            );
            return Outcome::Skip(SkipReason::Redirection(status));
        }
        400..=499 => {
            error!(
                target = "patchwork::client::reconcile",
                status, "client error on a fragment exchange"
            );
            return Outcome::Skip(SkipReason::ClientError(status));
        }
        500.. => {
            error!(
                target = "patchwork::client::reconcile",
                status, "server error on a fragment exchange"
            );
            return Outcome::Skip(SkipReason::ServerError(status));
        }
        _ => {}
    }

    if status == 204 {
        return Outcome::Skip(SkipReason::NoContent);
    }
    if request.method == Method::Delete && status == 200 {
        return Outcome::Skip(SkipReason::Deleted);
    }

    let ignore_active_value = response
        .header(wire::MORPH_IGNORE_ACTIVE)
        .is_some_and(parse_flag);

    if let Some(target) = &request.target {
        return Outcome::Merge(MergePlan::Target {
            target: target.clone(),
            ignore_active_value,
        });
    }

    let Some(header) = response.header(wire::MERGE) else {
        if request.boosted {
            return Outcome::Merge(MergePlan::Document);
        }
        error!(
            target = "patchwork::client::reconcile",
            header = wire::MERGE,
            "response carries no merge manifest"
        );
        return Outcome::Skip(SkipReason::MissingManifest);
    };

    match SwapManifest::from_header_value(header) {
        Ok(manifest) => Outcome::Merge(MergePlan::Fragments {
            manifest,
            ignore_active_value,
        }),
        Err(err) => {
            error!(
                target = "patchwork::client::reconcile",
                error = %err,
                "merge manifest could not be decoded"
            );
            Outcome::Skip(SkipReason::MalformedManifest(err.to_string()))
        }
    }
}

/// A top-level node of a parsed fragment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentNode {
    Element { id: String },
    /// `<template>` elements are inert and never merged.
    Template,
    /// Text, comments and other non-element nodes.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Apply {
        index: usize,
        target: String,
        strategy: SwapStrategy,
    },
    Ignore {
        index: usize,
    },
    MissingTarget {
        index: usize,
        id: String,
    },
    MissingEntry {
        index: usize,
        id: String,
    },
}

/// Pair each emitted node with its live target and manifest entry.
///
/// Lookups are by identifier only; the order of manifest entries does not
/// matter. A node without a live target or without a manifest entry is
/// skipped and the remaining nodes are still merged.
pub fn plan_fragments(
    manifest: &SwapManifest,
    nodes: &[FragmentNode],
    target_exists: impl Fn(&str) -> bool,
) -> Vec<Step> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| match node {
            FragmentNode::Template | FragmentNode::Other => Step::Ignore { index },
            FragmentNode::Element { id } if id.is_empty() || !target_exists(id) => {
                error!(
                    target = "patchwork::client::reconcile",
                    id = %id,
                    "no element in the page carries this id"
                );
                Step::MissingTarget {
                    index,
                    id: id.clone(),
                }
            }
            FragmentNode::Element { id } => match manifest.strategy_for(id) {
                Some(strategy) => Step::Apply {
                    index,
                    target: id.clone(),
                    strategy,
                },
                None => {
                    error!(
                        target = "patchwork::client::reconcile",
                        id = %id,
                        "no manifest entry for this id"
                    );
                    Step::MissingEntry {
                        index,
                        id: id.clone(),
                    }
                }
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use patchwork_protocol::ManifestEntry;

    use super::*;

    fn manifest(entries: &[(&str, SwapStrategy)]) -> SwapManifest {
        entries
            .iter()
            .map(|(target, strategy)| ManifestEntry::new(*target, *strategy))
            .collect()
    }

    fn request(method: Method) -> RequestDescriptor {
        RequestDescriptor::new("/items", method)
    }

    fn ok_with_manifest() -> ResponseSnapshot {
        ResponseSnapshot::new(200, "<div id=\"a\"></div>")
            .with_header("Patch-Merge", r#"[{"target":"a","strategy":"morph"}]"#)
    }

    #[test]
    fn redirect_header_wins_over_a_manifest() {
        let response = ok_with_manifest().with_header("Patch-Redirect", "/elsewhere");
        assert_eq!(
            assess(&request(Method::Post), &response),
            Outcome::Redirect("/elsewhere".to_string())
        );
    }

    #[test]
    fn redirect_header_wins_over_error_statuses() {
        let response = ResponseSnapshot::new(500, "").with_header("patch-redirect", "/error?code=500");
        assert_eq!(
            assess(&request(Method::Post), &response),
            Outcome::Redirect("/error?code=500".to_string())
        );
    }

    #[test]
    fn non_success_statuses_never_merge() {
        for (status, reason) in [
            (302, SkipReason::Redirection(302)),
            (404, SkipReason::ClientError(404)),
            (503, SkipReason::ServerError(503)),
        ] {
            let mut response = ok_with_manifest();
            response.status = status;
            assert_eq!(assess(&request(Method::Get), &response), Outcome::Skip(reason));
        }
    }

    #[test]
    fn no_content_and_successful_delete_skip_the_merge() {
        let empty = ResponseSnapshot::new(204, "");
        assert_eq!(
            assess(&request(Method::Patch), &empty),
            Outcome::Skip(SkipReason::NoContent)
        );

        let deleted = ResponseSnapshot::new(200, "");
        assert_eq!(
            assess(&request(Method::Delete), &deleted),
            Outcome::Skip(SkipReason::Deleted)
        );
    }

    #[test]
    fn manifest_and_ignore_flag_are_decoded() {
        let response = ok_with_manifest().with_header("Patch-Morph-Ignore-Active", "True");
        let Outcome::Merge(MergePlan::Fragments {
            manifest,
            ignore_active_value,
        }) = assess(&request(Method::Post), &response)
        else {
            panic!("expected a fragment merge");
        };
        assert!(ignore_active_value);
        assert_eq!(manifest.strategy_for("a"), Some(SwapStrategy::Morph));
    }

    #[test]
    fn missing_manifest_merges_documents_only_for_boosted_requests() {
        let page = ResponseSnapshot::new(200, "<html></html>");
        assert_eq!(
            assess(&request(Method::Get).boosted(), &page),
            Outcome::Merge(MergePlan::Document)
        );
        assert_eq!(
            assess(&request(Method::Get), &page),
            Outcome::Skip(SkipReason::MissingManifest)
        );
    }

    #[test]
    fn malformed_manifest_is_skipped() {
        let response = ResponseSnapshot::new(200, "").with_header("patch-merge", "{nope");
        assert!(matches!(
            assess(&request(Method::Post), &response),
            Outcome::Skip(SkipReason::MalformedManifest(_))
        ));
    }

    #[test]
    fn explicit_target_overrides_the_manifest() {
        let request = request(Method::Post).with_target("counter", SwapStrategy::Morph);
        let response = ok_with_manifest().with_header("Patch-Morph-Ignore-Active", "true");
        assert_eq!(
            assess(&request, &response),
            Outcome::Merge(MergePlan::Target {
                target: MergeTarget {
                    id: "counter".to_string(),
                    strategy: SwapStrategy::Morph,
                },
                ignore_active_value: true,
            })
        );
    }

    #[test]
    fn explicit_target_needs_no_manifest() {
        let request = request(Method::Get).with_target("counter", SwapStrategy::Replace);
        let response = ResponseSnapshot::new(200, "<span>3</span>");
        assert!(matches!(
            assess(&request, &response),
            Outcome::Merge(MergePlan::Target { .. })
        ));
    }

    #[test]
    fn explicit_target_still_respects_status_and_redirect() {
        let targeted = request(Method::Post).with_target("counter", SwapStrategy::Replace);
        assert_eq!(
            assess(&targeted, &ResponseSnapshot::new(422, "")),
            Outcome::Skip(SkipReason::ClientError(422))
        );
        assert_eq!(
            assess(&targeted, &ResponseSnapshot::new(204, "")),
            Outcome::Skip(SkipReason::NoContent)
        );
        let redirected = ResponseSnapshot::new(200, "").with_header("patch-redirect", "/done");
        assert_eq!(
            assess(&targeted, &redirected),
            Outcome::Redirect("/done".to_string())
        );
    }

    #[test]
    fn nodes_are_matched_by_identifier_not_position() {
        let manifest = manifest(&[("b", SwapStrategy::Morph), ("a", SwapStrategy::Replace)]);
        let nodes = vec![
            FragmentNode::Element { id: "a".into() },
            FragmentNode::Other,
            FragmentNode::Element { id: "b".into() },
        ];

        let steps = plan_fragments(&manifest, &nodes, |_| true);
        assert_eq!(
            steps,
            vec![
                Step::Apply {
                    index: 0,
                    target: "a".into(),
                    strategy: SwapStrategy::Replace,
                },
                Step::Ignore { index: 1 },
                Step::Apply {
                    index: 2,
                    target: "b".into(),
                    strategy: SwapStrategy::Morph,
                },
            ]
        );
    }

    #[test]
    fn lookup_failures_skip_only_the_affected_node() {
        let manifest = manifest(&[("a", SwapStrategy::Replace), ("ghost", SwapStrategy::Replace)]);
        let nodes = vec![
            FragmentNode::Element { id: "ghost".into() },
            FragmentNode::Element { id: "a".into() },
            FragmentNode::Element { id: "unlisted".into() },
            FragmentNode::Template,
            FragmentNode::Element { id: String::new() },
        ];

        let steps = plan_fragments(&manifest, &nodes, |id| id != "ghost");
        assert_eq!(
            steps,
            vec![
                Step::MissingTarget {
                    index: 0,
                    id: "ghost".into(),
                },
                Step::Apply {
                    index: 1,
                    target: "a".into(),
                    strategy: SwapStrategy::Replace,
                },
                Step::MissingEntry {
                    index: 2,
                    id: "unlisted".into(),
                },
                Step::Ignore { index: 3 },
                Step::MissingTarget {
                    index: 4,
                    id: String::new(),
                },
            ]
        );
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How an emitted fragment is merged into the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStrategy {
    /// Substitute the target node wholesale.
    #[default]
    Replace,
    /// Diff-patch the target in place, preserving unrelated node state.
    Morph,
}

impl SwapStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapStrategy::Replace => "replace",
            SwapStrategy::Morph => "morph",
        }
    }
}

impl fmt::Display for SwapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown swap strategy `{0}`")]
pub struct UnknownStrategy(pub String);

impl FromStr for SwapStrategy {
    type Err = UnknownStrategy;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim();
        if token.eq_ignore_ascii_case("replace") {
            Ok(SwapStrategy::Replace)
        } else if token.eq_ignore_ascii_case("morph") {
            Ok(SwapStrategy::Morph)
        } else {
            Err(UnknownStrategy(raw.to_string()))
        }
    }
}

/// One `(target, strategy)` pair of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub target: String,
    pub strategy: SwapStrategy,
}

impl ManifestEntry {
    pub fn new(target: impl Into<String>, strategy: SwapStrategy) -> Self {
        Self {
            target: target.into(),
            strategy,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("swap manifest is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("swap manifest entry {index} has an empty target")]
    EmptyTarget { index: usize },
}

/// Ordered swap manifest.
///
/// Order mirrors fragment declaration order on the server, but consumers must
/// associate entries with emitted elements by identifier: fragments are
/// concatenated into one body and looked up individually.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapManifest(Vec<ManifestEntry>);

impl SwapManifest {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, target: impl Into<String>, strategy: SwapStrategy) -> &mut Self {
        self.0.push(ManifestEntry::new(target, strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.0.iter()
    }

    /// Strategy declared for `target`; the first matching entry wins.
    pub fn strategy_for(&self, target: &str) -> Option<SwapStrategy> {
        self.0
            .iter()
            .find(|entry| entry.target == target)
            .map(|entry| entry.strategy)
    }

    /// Encode as the JSON array carried in the merge header.
    pub fn to_header_value(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_header_value(value: &str) -> Result<Self, ManifestError> {
        let entries: Vec<ManifestEntry> = serde_json::from_str(value)?;
        if let Some(index) = entries.iter().position(|entry| entry.target.is_empty()) {
            return Err(ManifestError::EmptyTarget { index });
        }
        Ok(Self(entries))
    }
}

impl FromIterator<ManifestEntry> for SwapManifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SwapManifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn header_value_keeps_declaration_order() {
        let mut manifest = SwapManifest::new();
        manifest
            .push("a", SwapStrategy::Replace)
            .push("b", SwapStrategy::Morph);

        let header = manifest.to_header_value().expect("manifest encodes");
        assert_snapshot!(header, @r#"[{"target":"a","strategy":"replace"},{"target":"b","strategy":"morph"}]"#);
    }

    #[test]
    fn lookup_is_by_identifier_not_position() {
        let manifest = SwapManifest::from_header_value(
            r#"[{"target":"b","strategy":"morph"},{"target":"a","strategy":"replace"}]"#,
        )
        .expect("manifest decodes");

        assert_eq!(manifest.strategy_for("a"), Some(SwapStrategy::Replace));
        assert_eq!(manifest.strategy_for("b"), Some(SwapStrategy::Morph));
        assert_eq!(manifest.strategy_for("c"), None);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = SwapManifest::from_header_value(r#"[{"target":"a","strategy":"append"}]"#)
            .expect_err("unknown strategy token");
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = SwapManifest::from_header_value(
            r#"[{"target":"a","strategy":"morph"},{"target":"","strategy":"replace"}]"#,
        )
        .expect_err("empty target");
        assert!(matches!(err, ManifestError::EmptyTarget { index: 1 }));
    }

    #[test]
    fn strategy_tokens_parse_case_insensitively() {
        assert_eq!("morph".parse::<SwapStrategy>(), Ok(SwapStrategy::Morph));
        assert_eq!(" Replace ".parse::<SwapStrategy>(), Ok(SwapStrategy::Replace));
        assert_eq!(
            "append".parse::<SwapStrategy>(),
            Err(UnknownStrategy("append".to_string()))
        );
    }

    #[test]
    fn default_strategy_is_replace() {
        assert_eq!(SwapStrategy::default(), SwapStrategy::Replace);
        assert_eq!(SwapStrategy::Morph.to_string(), "morph");
    }
}

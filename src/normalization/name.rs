/// Canonicalized name key used to match external labels against local ones.
///
/// Matching is exact after normalization; no fuzzy scoring is applied, so
/// "Any%" and "Any% NMG" stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey(String);

impl NameKey {
    /// Build a comparison key from a raw label.
    ///
    /// Normalization steps:
    /// - trim surrounding whitespace
    /// - lowercase (Unicode aware, so "Ü" and "ü" compare equal)
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for NameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for `NameKey::new(raw).as_str()` when only the string is needed.
pub fn normalize(raw: &str) -> String {
    NameKey::new(raw).0
}

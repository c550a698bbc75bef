//! Score explanations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a score was computed: a value, what it is, and the values it was
/// computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// The value of this node.
    pub value: f32,

    /// What the value is.
    pub description: String,

    /// Sub-explanations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Explanation>,

    /// Explicit match flag; when absent a positive value means a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
}

impl Explanation {
    /// A leaf explanation.
    pub fn new<S: Into<String>>(value: f32, description: S) -> Self {
        Explanation {
            value,
            description: description.into(),
            details: Vec::new(),
            matched: None,
        }
    }

    /// An explanation with an explicit match flag.
    pub fn with_match<S: Into<String>>(matched: bool, value: f32, description: S) -> Self {
        Explanation {
            matched: Some(matched),
            ..Self::new(value, description)
        }
    }

    /// An explicit non-match with value zero.
    pub fn no_match<S: Into<String>>(description: S) -> Self {
        Self::with_match(false, 0.0, description)
    }

    /// Append a sub-explanation.
    pub fn add_detail(&mut self, detail: Explanation) {
        self.details.push(detail);
    }

    /// Builder form of [`add_detail`](Self::add_detail).
    pub fn detail(mut self, detail: Explanation) -> Self {
        self.details.push(detail);
        self
    }

    /// Whether the document matched.
    pub fn is_match(&self) -> bool {
        self.matched.unwrap_or(self.value > 0.0)
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{} = {}", "", self.value, self.description, indent = depth * 2)?;
        for detail in &self.details {
            detail.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let expl = Explanation::new(0.5, "product of:")
            .detail(Explanation::new(2.0, "boost"))
            .detail(Explanation::new(0.25, "queryNorm"));
        assert_eq!(expl.to_string(), "0.5 = product of:\n  2 = boost\n  0.25 = queryNorm\n");
    }

    #[test]
    fn test_match_flag() {
        assert!(Explanation::new(0.1, "x").is_match());
        assert!(!Explanation::new(0.0, "x").is_match());
        assert!(!Explanation::with_match(false, 3.0, "x").is_match());
        assert!(Explanation::with_match(true, 0.0, "x").is_match());
    }

    #[test]
    fn test_json() {
        let expl = Explanation::no_match("failure").detail(Explanation::new(1.0, "inner"));
        let json = serde_json::to_string(&expl).unwrap();
        let back: Explanation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expl);
        assert!(!json.contains("\"details\":[]"));
    }
}

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TEMPLATE_MAX_LENGTH: usize = 32;

/// Normalizes a user supplied template name: brackets removed, whitespace
/// runs collapsed, trimmed and capped at `max_len` characters.
pub fn clean_template_name(raw: &str, max_len: usize) -> Option<String> {
    let unbracketed: String = raw.chars().filter(|c| *c != '[' && *c != ']').collect();
    let collapsed = unbracketed.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(max_len).collect();
    let cleaned = capped.trim_end();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn fold(label: &str) -> String {
    label.to_lowercase()
}

/// Ordered template labels, unique ignoring case. The first spelling seen
/// for a label is the one kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateSet {
    labels: Vec<String>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical spelling of `name` if a label matches it ignoring case.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let folded = fold(name);
        self.labels
            .iter()
            .find(|label| fold(label) == folded)
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Adds `label` unless an equivalent one exists; returns the canonical
    /// spelling either way.
    pub fn insert(&mut self, label: &str) -> String {
        if let Some(existing) = self.resolve(label) {
            return existing.to_string();
        }
        debug!(label, "registering template");
        self.labels.push(label.to_string());
        label.to_string()
    }

    /// Removes the label matching `name` ignoring case and returns its
    /// canonical spelling.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let folded = fold(name);
        let idx = self.labels.iter().position(|label| fold(label) == folded)?;
        Some(self.labels.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{TemplateSet, clean_template_name};

    #[rstest]
    #[case("  Work  ", Some("Work"))]
    #[case("[Home]", Some("Home"))]
    #[case("deep   \t work\nitems", Some("deep work items"))]
    #[case("[ ]", None)]
    #[case("", None)]
    #[case("abcdefghij", Some("abcde"))]
    #[case("abcd efgh", Some("abcd"))]
    fn cleans_names(#[case] raw: &str, #[case] expected: Option<&str>) {
        let max = if raw.starts_with("abcd") { 5 } else { 32 };
        assert_eq!(clean_template_name(raw, max).as_deref(), expected);
    }

    #[test]
    fn capping_respects_char_boundaries() {
        assert_eq!(clean_template_name("ééééé", 3).as_deref(), Some("ééé"));
    }

    #[test]
    fn first_spelling_wins() {
        let mut set = TemplateSet::new();
        assert_eq!(set.insert("Work"), "Work");
        assert_eq!(set.insert("work"), "Work");
        assert_eq!(set.insert("WORK"), "Work");
        assert_eq!(set.len(), 1);
        assert_eq!(set.resolve("wOrK"), Some("Work"));
    }

    #[test]
    fn keeps_insertion_order_and_removes_case_insensitively() {
        let mut set = TemplateSet::new();
        set.insert("Work");
        set.insert("Home");
        set.insert("Errands");
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Work", "Home", "Errands"]);

        assert_eq!(set.remove("home").as_deref(), Some("Home"));
        assert_eq!(set.remove("home"), None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Work", "Errands"]);
    }
}

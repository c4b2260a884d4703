use crate::index::{field_str, Document};

/// Equality match on one named string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Experiences belonging to one destination.
    pub fn parent_destination(destination_id: impl Into<String>) -> Self {
        Self::equals("parent_destination_id", destination_id)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        field_str(doc, &self.field) == Some(self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fixtures::doc;
    use serde_json::json;

    #[test]
    fn test_matches_exact_string_only() {
        let filter = FieldFilter::parent_destination("D1");
        assert!(filter.matches(&doc(json!({"parent_destination_id": "D1"}))));
        assert!(!filter.matches(&doc(json!({"parent_destination_id": "D10"}))));
        assert!(!filter.matches(&doc(json!({"parent_destination_id": "d1"}))));
        assert!(!filter.matches(&doc(json!({"destination_id": "D1"}))));
        assert!(!filter.matches(&doc(json!({"parent_destination_id": null}))));
    }

    #[test]
    fn test_non_string_values_never_match() {
        let filter = FieldFilter::equals("cost_index", "3");
        assert!(!filter.matches(&doc(json!({"cost_index": 3}))));
    }
}

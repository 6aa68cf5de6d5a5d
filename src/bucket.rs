use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_JUNIOR_CATEGORY_IDS: [i64; 8] = [1, 2, 3, 4, 5, 6, 7, 12];
pub const DEFAULT_BUCKET_ID: i64 = 0;
pub const DEFAULT_BUCKET_NAME: &str = "Cabe Rawit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    Summary,
    #[default]
    All,
}

impl ViewMode {
    /// Only `"summary"` collapses junior categories; every other value is the detailed view.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("summary") {
            ViewMode::Summary
        } else {
            ViewMode::All
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Summary => "summary",
            ViewMode::All => "all",
        }
    }
}

/// Maps raw category ids onto display categories. In summary view every junior
/// category collapses into one synthetic bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBucketer {
    junior_ids: BTreeSet<i64>,
    bucket_id: i64,
    bucket_name: String,
}

impl Default for CategoryBucketer {
    fn default() -> Self {
        Self::new(
            DEFAULT_JUNIOR_CATEGORY_IDS,
            DEFAULT_BUCKET_ID,
            DEFAULT_BUCKET_NAME,
        )
    }
}

impl CategoryBucketer {
    pub fn new<I>(junior_ids: I, bucket_id: i64, bucket_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Self {
            junior_ids: junior_ids.into_iter().collect(),
            bucket_id,
            bucket_name: bucket_name.into(),
        }
    }

    pub fn is_junior(&self, category_id: i64) -> bool {
        self.junior_ids.contains(&category_id)
    }

    pub fn resolve(&self, category_id: i64, category_name: &str, view: ViewMode) -> (i64, String) {
        if view == ViewMode::Summary && self.is_junior(category_id) {
            return (self.bucket_id, self.bucket_name.clone());
        }
        (category_id, category_name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_collapses_junior_ids() {
        let b = CategoryBucketer::default();
        assert_eq!(
            b.resolve(3, "X", ViewMode::parse("summary")),
            (0, "Cabe Rawit".to_string())
        );
        assert_eq!(
            b.resolve(12, "PAUD", ViewMode::Summary),
            (0, "Cabe Rawit".to_string())
        );
    }

    #[test]
    fn detailed_view_leaves_ids_unchanged() {
        let b = CategoryBucketer::default();
        assert_eq!(b.resolve(3, "X", ViewMode::parse("all")), (3, "X".to_string()));
        assert_eq!(
            b.resolve(3, "X", ViewMode::parse("detailed")),
            (3, "X".to_string())
        );
    }

    #[test]
    fn non_junior_ids_pass_through_summary() {
        let b = CategoryBucketer::default();
        assert_eq!(b.resolve(8, "Y", ViewMode::Summary), (8, "Y".to_string()));
    }

    #[test]
    fn custom_configuration_is_honoured() {
        let b = CategoryBucketer::new([20, 21], 99, "Remaja");
        assert_eq!(b.resolve(21, "Praja", ViewMode::Summary), (99, "Remaja".to_string()));
        assert_eq!(b.resolve(3, "X", ViewMode::Summary), (3, "X".to_string()));
    }
}

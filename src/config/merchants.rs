//! Merchant keyword table and budget category list.
//!
//! Built once at start-up and shared behind an `Arc`; there is no way to
//! mutate a table after construction.

pub const UNCATEGORIZED: &str = "Uncategorized";

const KENYAN_MERCHANTS: &[(&str, &str)] = &[
    ("naivas", "Groceries"),
    ("carrefour", "Groceries"),
    ("quickmart", "Groceries"),
    ("chandarana", "Groceries"),
    ("kplc", "Utilities"),
    ("kenya power", "Utilities"),
    ("nairobi water", "Utilities"),
    ("safaricom home", "Utilities"),
    ("zuku", "Entertainment"),
    ("showmax", "Entertainment"),
    ("dstv", "Entertainment"),
    ("uber", "Transport"),
    ("bolt", "Transport"),
    ("m-shwari", "Savings"),
    ("sacco", "Savings"),
];

const KENYAN_CATEGORIES: &[&str] = &[
    "Groceries",
    "Utilities",
    "Entertainment",
    "Transport",
    "Savings",
    "Emergency Fund",
    "Education",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantRule {
    keyword: String,
    category: String,
}

impl MerchantRule {
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

#[derive(Debug, Clone)]
pub struct MerchantTable {
    rules: Vec<MerchantRule>,
    categories: Vec<String>,
}

impl MerchantTable {
    /// Builds a table from `(keyword, category)` pairs. Keywords are matched
    /// case-insensitively; earlier pairs win.
    pub fn new<K, C>(rules: impl IntoIterator<Item = (K, C)>, categories: &[&str]) -> Self
    where
        K: Into<String>,
        C: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(keyword, category)| MerchantRule {
                keyword: keyword.into().to_lowercase(),
                category: category.into(),
            })
            .filter(|rule| !rule.keyword.trim().is_empty())
            .collect();

        Self {
            rules,
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn kenyan_defaults() -> Self {
        Self::new(KENYAN_MERCHANTS.iter().copied(), KENYAN_CATEGORIES)
    }

    pub fn lookup(&self, description: &str) -> Option<&str> {
        let haystack = description.to_lowercase();
        self.rules
            .iter()
            .find(|rule| haystack.contains(&rule.keyword))
            .map(|rule| rule.category.as_str())
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn rules(&self) -> &[MerchantRule] {
        &self.rules
    }
}

use super::index::{IndexStats, Record, RecordIndex};

/// Which of the two device collections a submission number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// 510(k) premarket notifications (and De Novo requests).
    Premarket,
    /// Premarket approvals.
    Pma,
}

impl Collection {
    pub fn label(self) -> &'static str {
        match self {
            Collection::Premarket => "510k",
            Collection::Pma => "pma",
        }
    }
}

/// Prefix rule selecting the collection for a submission number.
#[derive(Debug, Clone)]
pub struct Router {
    premarket_prefixes: Vec<String>,
}

impl Router {
    pub fn new(premarket_prefixes: Vec<String>) -> Self {
        Self { premarket_prefixes }
    }

    /// Numbers starting with a premarket prefix go to the 510(k) index,
    /// everything else to the PMA index. Case-sensitive.
    pub fn route(&self, submission: &str) -> Collection {
        if self
            .premarket_prefixes
            .iter()
            .any(|p| submission.starts_with(p.as_str()))
        {
            Collection::Premarket
        } else {
            Collection::Pma
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(vec!["K".to_string(), "DEN".to_string()])
    }
}

/// Both indexes, loaded once per run.
#[derive(Debug, Default)]
pub struct IndexSet {
    pub premarket: RecordIndex,
    pub pma: RecordIndex,
    pub premarket_stats: IndexStats,
    pub pma_stats: IndexStats,
}

impl IndexSet {
    pub fn get(&self, collection: Collection, submission: &str) -> Option<&Record> {
        match collection {
            Collection::Premarket => self.premarket.get(submission),
            Collection::Pma => self.pma.get(submission),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_by_prefix() {
        let router = Router::default();
        assert_eq!(router.route("K240369"), Collection::Premarket);
        assert_eq!(router.route("DEN200045"), Collection::Premarket);
        assert_eq!(router.route("P170019"), Collection::Pma);
        assert_eq!(router.route("H010004"), Collection::Pma);
        assert_eq!(router.route(""), Collection::Pma);
    }

    #[test]
    fn test_route_is_case_sensitive() {
        let router = Router::default();
        assert_eq!(router.route("k240369"), Collection::Pma);
        assert_eq!(router.route("den200045"), Collection::Pma);
    }

    #[test]
    fn test_custom_prefixes() {
        let router = Router::new(vec!["BK".to_string()]);
        assert_eq!(router.route("BK123456"), Collection::Premarket);
        assert_eq!(router.route("K240369"), Collection::Pma);
    }

    #[test]
    fn test_index_set_looks_up_only_routed_collection() {
        let mut set = IndexSet::default();
        let record = json!({"k_number": "X1", "city": "BOSTON"});
        set.premarket.insert("X1".to_string(), record.as_object().cloned().unwrap());
        assert!(set.get(Collection::Premarket, "X1").is_some());
        assert!(set.get(Collection::Pma, "X1").is_none());
    }
}

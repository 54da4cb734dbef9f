// src/live/query.rs

use crate::domain::history::HistoryEntry;
use crate::error::AppResult;
use crate::repositories::HistoryRepository;

/// Identity of a live query. Subscribers of equal queries share one
/// re-evaluation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiveQuery {
    /// `recent_history(limit)`
    Recent { limit: usize },
    /// `incomplete_history()`
    Incomplete,
}

impl LiveQuery {
    /// Run the query against the last committed state. Blocking.
    pub fn evaluate(&self, repository: &dyn HistoryRepository) -> AppResult<Vec<HistoryEntry>> {
        match self {
            LiveQuery::Recent { limit } => repository.recent(*limit),
            LiveQuery::Incomplete => repository.incomplete(),
        }
    }
}

impl std::fmt::Display for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveQuery::Recent { limit } => write!(f, "recent({})", limit),
            LiveQuery::Incomplete => write!(f, "incomplete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MockHistoryRepository;

    #[test]
    fn test_recent_dispatches_with_limit() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_recent()
            .withf(|limit| *limit == 7)
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let rows = LiveQuery::Recent { limit: 7 }.evaluate(&repo).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_incomplete_dispatches() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_incomplete().times(1).returning(|| Ok(Vec::new()));

        LiveQuery::Incomplete.evaluate(&repo).unwrap();
    }

    #[test]
    fn test_display() {
        assert_eq!(LiveQuery::Recent { limit: 5 }.to_string(), "recent(5)");
        assert_eq!(LiveQuery::Incomplete.to_string(), "incomplete");
    }
}

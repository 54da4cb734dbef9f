// src/services/history_service_tests.rs
//
// HISTORY SERVICE TESTS
//
// INVARIANTS TESTED:
// - A successful write emits exactly one event, a failed write emits none
// - record_progress upserts by natural key and keeps first_watched
// - record_progress marks completion at the configured threshold
// - continue_watching groups by media_id and reports has_more

#[cfg(test)]
mod sqlite_backed {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::db::connection::test_support::create_test_pool;
    use crate::domain::history::HistoryEntry;
    use crate::error::AppError;
    use crate::events::EventBus;
    use crate::repositories::{HistoryRepository, SqliteHistoryRepository};
    use crate::services::{HistoryConfig, HistoryService, RecordProgressRequest};

    struct Fixture {
        _dir: TempDir,
        bus: Arc<EventBus>,
        service: HistoryService,
    }

    fn fixture() -> Fixture {
        let (dir, pool) = create_test_pool();
        let repo: Arc<dyn HistoryRepository> = Arc::new(SqliteHistoryRepository::new(pool));
        let bus = Arc::new(EventBus::new());
        let service = HistoryService::new(repo, Arc::clone(&bus), HistoryConfig::default());
        Fixture {
            _dir: dir,
            bus,
            service,
        }
    }

    fn emitted(bus: &EventBus) -> Vec<String> {
        bus.get_event_log()
            .into_iter()
            .map(|entry| entry.event_type)
            .collect()
    }

    fn progress(media_id: &str, episode_id: Option<&str>, position: i64) -> RecordProgressRequest {
        RecordProgressRequest {
            media_id: media_id.to_string(),
            title: "Show".to_string(),
            media_type: "tv".to_string(),
            url: "https://example.test/watch".to_string(),
            poster_image: None,
            episode_id: episode_id.map(str::to_string),
            episode_title: episode_id.map(|e| format!("Episode {}", e)),
            season_number: episode_id.map(|_| 1),
            episode_number: episode_id.map(|_| 1),
            position,
            duration: 1_000,
        }
    }

    fn watched(media_id: &str, last_watched: i64, completed: bool) -> HistoryEntry {
        let mut entry = HistoryEntry::new(media_id, media_id, "movie", "u");
        entry.last_watched = last_watched;
        entry.first_watched = last_watched;
        entry.completed = completed;
        entry
    }

    #[test]
    fn test_insert_emits_one_event() {
        let fx = fixture();
        fx.service.insert(&watched("a", 1, false)).unwrap();
        assert_eq!(emitted(&fx.bus), vec!["HistoryEntryInserted"]);
    }

    #[test]
    fn test_invalid_entry_is_rejected_without_event() {
        let fx = fixture();
        let entry = watched("", 1, false);

        let err = fx.service.insert(&entry).unwrap_err();
        assert!(matches!(err, AppError::TransactionAborted(_)));
        assert_eq!(fx.service.history_count().unwrap(), 0);
        assert!(emitted(&fx.bus).is_empty());
    }

    #[test]
    fn test_unrestricted_fields_are_stored_as_given() {
        let fx = fixture();
        let mut entry = watched("m", 1, false);
        entry.position = -1;
        entry.season_number = Some(1);

        let row_id = fx.service.insert(&entry).unwrap();
        let stored = fx.service.history_entry("m", None).unwrap().unwrap();
        assert_eq!(stored.row_id, row_id);
        assert_eq!(stored.position, -1);
        assert_eq!(stored.season_number, Some(1));
    }

    #[test]
    fn test_non_finite_percent_aborts() {
        let fx = fixture();
        let mut entry = watched("m", 1, false);
        entry.percent_watched = f64::NAN;

        let err = fx.service.insert(&entry).unwrap_err();
        assert!(matches!(err, AppError::TransactionAborted(_)));
        assert_eq!(fx.service.history_count().unwrap(), 0);
    }

    #[test]
    fn test_update_of_missing_row_aborts_without_event() {
        let fx = fixture();
        let mut entry = watched("a", 1, false);
        entry.row_id = 99;

        let err = fx.service.update(&entry).unwrap_err();
        assert!(matches!(err, AppError::TransactionAborted(_)));
        assert!(emitted(&fx.bus).is_empty());
    }

    #[test]
    fn test_delete_of_nothing_still_emits() {
        let fx = fixture();
        let removed = fx.service.delete_entry("ghost", None).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(emitted(&fx.bus), vec!["HistoryEntryDeleted"]);
    }

    #[test]
    fn test_record_progress_upserts_by_natural_key() {
        let fx = fixture();

        let first = fx.service.record_progress(progress("show", Some("e1"), 100)).unwrap();
        assert!(first.inserted);
        let before = fx
            .service
            .history_entry("show", Some("e1".to_string()))
            .unwrap()
            .unwrap();

        let second = fx.service.record_progress(progress("show", Some("e1"), 400)).unwrap();
        assert!(!second.inserted);
        assert_eq!(second.row_id, first.row_id);

        assert_eq!(fx.service.history_count().unwrap(), 1);
        let after = fx
            .service
            .history_entry("show", Some("e1".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(after.position, 400);
        assert_eq!(after.percent_watched, 40.0);
        assert_eq!(after.first_watched, before.first_watched);

        assert_eq!(
            emitted(&fx.bus),
            vec!["HistoryEntryInserted", "HistoryEntryUpdated"]
        );
    }

    #[test]
    fn test_record_progress_marks_completion_at_threshold() {
        let fx = fixture();

        fx.service.record_progress(progress("m", None, 899)).unwrap();
        assert!(fx.service.incomplete_history().unwrap().len() == 1);

        fx.service.record_progress(progress("m", None, 900)).unwrap();
        let entry = fx.service.history_entry("m", None).unwrap().unwrap();
        assert!(entry.completed);
        assert!(fx.service.incomplete_history().unwrap().is_empty());
    }

    #[test]
    fn test_movie_lookup_ignores_episodes() {
        let fx = fixture();
        fx.service.record_progress(progress("show", Some("e1"), 10)).unwrap();

        assert!(fx.service.history_entry("show", None).unwrap().is_none());

        fx.service.record_progress(progress("show", None, 10)).unwrap();
        let show_level = fx.service.history_entry("show", None).unwrap().unwrap();
        assert!(show_level.episode_id.is_none());
    }

    #[test]
    fn test_recent_history_uses_default_limit() {
        let fx = fixture();
        for i in 0..55 {
            fx.service.insert(&watched(&format!("m{}", i), i, false)).unwrap();
        }

        assert_eq!(fx.service.recent_history(None).unwrap().len(), 50);
        assert_eq!(fx.service.recent_history(Some(3)).unwrap().len(), 3);
        assert!(fx.service.recent_history(Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_continue_watching_groups_by_media() {
        let fx = fixture();
        let mut e1 = watched("show", 10, false);
        e1.episode_id = Some("e1".to_string());
        let mut e2 = watched("show", 30, false);
        e2.episode_id = Some("e2".to_string());
        fx.service.insert(&e1).unwrap();
        fx.service.insert(&e2).unwrap();
        fx.service.insert(&watched("movie", 20, false)).unwrap();
        fx.service.insert(&watched("done", 40, true)).unwrap();

        let page = fx.service.continue_watching(10, 0).unwrap();
        assert_eq!(page.total, 3);
        assert!(!page.has_more);

        let ids: Vec<_> = page
            .entries
            .iter()
            .map(|e| (e.media_id.as_str(), e.episode_id.as_deref()))
            .collect();
        assert_eq!(ids, vec![("show", Some("e2")), ("movie", None)]);
    }

    #[test]
    fn test_continue_watching_reports_more_pages() {
        let fx = fixture();
        for i in 0..5 {
            fx.service.insert(&watched(&format!("m{}", i), i, false)).unwrap();
        }

        let first = fx.service.continue_watching(2, 0).unwrap();
        assert!(first.has_more);
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.entries[0].media_id, "m4");

        let last = fx.service.continue_watching(2, 4).unwrap();
        assert!(!last.has_more);
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.total, 5);
    }

    #[test]
    fn test_history_by_show() {
        let fx = fixture();
        let mut a = watched("a", 1, false);
        a.title = "Dark".to_string();
        let mut b = watched("b", 2, false);
        b.title = "Lost".to_string();
        fx.service.insert(&a).unwrap();
        fx.service.insert(&b).unwrap();

        let rows = fx.service.history_by_show("Dark").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].media_id, "a");
        assert_eq!(fx.service.all_history().unwrap().len(), 2);
    }

    #[test]
    fn test_compaction_emits_only_when_rows_removed() {
        let fx = fixture();
        fx.service.insert(&watched("a", 1, false)).unwrap();
        fx.service.insert(&watched("a", 2, false)).unwrap();
        fx.bus.clear_event_log();

        assert_eq!(fx.service.remove_duplicates().unwrap(), 1);
        assert_eq!(fx.service.remove_duplicates().unwrap(), 0);
        assert_eq!(fx.service.prune_oldest(10).unwrap(), 0);
        assert_eq!(fx.service.prune_oldest(0).unwrap(), 1);

        assert_eq!(emitted(&fx.bus), vec!["HistoryCompacted", "HistoryCompacted"]);
    }

    #[test]
    fn test_clear_all() {
        let fx = fixture();
        fx.service.insert(&watched("a", 1, false)).unwrap();
        fx.service.insert(&watched("b", 2, false)).unwrap();

        assert_eq!(fx.service.clear_all().unwrap(), 2);
        assert_eq!(fx.service.history_count().unwrap(), 0);
        assert_eq!(emitted(&fx.bus).last().map(String::as_str), Some("HistoryCleared"));
    }
}

#[cfg(test)]
mod mocked_repository {
    use std::sync::Arc;

    use crate::domain::history::HistoryEntry;
    use crate::error::AppError;
    use crate::events::EventBus;
    use crate::repositories::{MockHistoryRepository, UpsertOutcome};
    use crate::services::{HistoryConfig, HistoryService, RecordProgressRequest};

    fn service(repo: MockHistoryRepository) -> (Arc<EventBus>, HistoryService) {
        let bus = Arc::new(EventBus::new());
        let service = HistoryService::new(Arc::new(repo), Arc::clone(&bus), HistoryConfig::default());
        (bus, service)
    }

    #[test]
    fn test_storage_failure_propagates_without_event() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_insert()
            .times(1)
            .returning(|_| Err(AppError::StorageUnavailable("read-only medium".to_string())));

        let (bus, service) = service(repo);
        let err = service
            .insert(&HistoryEntry::new("m", "Movie", "movie", "u"))
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(bus.get_event_log().is_empty());
    }

    #[test]
    fn test_read_failure_is_not_an_empty_result() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_recent()
            .returning(|_| Err(AppError::StorageUnavailable("locked".to_string())));

        let (_bus, service) = service(repo);
        assert!(service.recent_history(Some(5)).is_err());
    }

    #[test]
    fn test_validation_happens_before_repository() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_update().times(0);

        let (_bus, service) = service(repo);
        let mut entry = HistoryEntry::new("", "Movie", "movie", "u");
        entry.row_id = 1;

        assert!(matches!(
            service.update(&entry),
            Err(AppError::TransactionAborted(_))
        ));
    }

    #[test]
    fn test_record_progress_computes_fields_before_upsert() {
        let mut repo = MockHistoryRepository::new();
        repo.expect_upsert_progress()
            .withf(|entry| {
                entry.percent_watched == 95.0
                    && entry.completed
                    && entry.first_watched == entry.last_watched
                    && entry.episode_id.as_deref() == Some("e3")
            })
            .times(1)
            .returning(|_| {
                Ok(UpsertOutcome {
                    row_id: 7,
                    inserted: false,
                })
            });

        let (bus, service) = service(repo);
        let outcome = service
            .record_progress(RecordProgressRequest {
                media_id: "show".to_string(),
                title: "Show".to_string(),
                media_type: "tv".to_string(),
                url: "u".to_string(),
                poster_image: Some("p.jpg".to_string()),
                episode_id: Some("e3".to_string()),
                episode_title: None,
                season_number: Some(1),
                episode_number: Some(3),
                position: 950,
                duration: 1_000,
            })
            .unwrap();

        assert_eq!(outcome.row_id, 7);
        let log = bus.get_event_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event_type, "HistoryEntryUpdated");
    }
}

use chrono::Duration;
use progress_core::model::{DailyGoal, FlashcardId, MasteryLevel, Owner, UserId};
use progress_core::time::fixed_now;
use storage::StorageError;
use storage::repository::{DailyGoalRepository, ProgressRepository};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn user(name: &str) -> Owner {
    Owner::User(UserId::new(name).unwrap())
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = repo("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(row.0, 1);
}

#[tokio::test]
async fn owners_do_not_see_each_other() {
    let repo = repo("memdb_owner_isolation").await;
    let alice = user("alice");
    let bob = user("bob");
    let card = FlashcardId::new(7);

    let created = repo
        .create(card, &alice, MasteryLevel::MIN, fixed_now())
        .await
        .unwrap();
    repo.compare_and_update(&created, &created.answered(true, fixed_now()))
        .await
        .unwrap();

    assert!(repo.get(card, &bob).await.unwrap().is_none());
    assert!(repo.get(card, &Owner::Anonymous).await.unwrap().is_none());
    assert_eq!(repo.stats_for(&[card], &bob).await.unwrap().untouched, 1);

    repo.set_daily_goal(&alice, DailyGoal::new(30).unwrap())
        .await
        .unwrap();
    assert_eq!(repo.get_daily_goal(&bob).await.unwrap(), None);

    repo.clear_all(&bob).await.unwrap();
    assert!(repo.get(card, &alice).await.unwrap().is_some());
}

#[tokio::test]
async fn stats_span_more_ids_than_one_query_binds() {
    let repo = repo("memdb_stats_chunks").await;
    let owner = user("bulk");
    let ids: Vec<FlashcardId> = (1..=1_200).map(FlashcardId::new).collect();

    for id in ids.iter().step_by(100) {
        let created = repo
            .create(*id, &owner, MasteryLevel::MIN, fixed_now())
            .await
            .unwrap();
        repo.compare_and_update(&created, &created.answered(true, fixed_now()))
            .await
            .unwrap();
    }

    let stats = repo.stats_for(&ids, &owner).await.unwrap();
    assert_eq!(stats.total, 1_200);
    assert_eq!(stats.in_progress, 12);
    assert_eq!(stats.untouched, 1_188);
    assert_eq!(stats.mastery_sum, 24);
}

#[tokio::test]
async fn compare_and_update_on_missing_record_is_not_found() {
    let repo = repo("memdb_cas_missing").await;
    let owner = user("ghost");
    let phantom = progress_core::model::ProgressRecord::new(
        FlashcardId::new(1),
        owner.clone(),
        MasteryLevel::MIN,
        fixed_now(),
    );
    let err = repo
        .compare_and_update(&phantom, &phantom.answered(true, fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn due_respects_limit_and_order() {
    let repo = repo("memdb_due_order").await;
    let owner = user("due");
    for (offset, id) in [(3, 1_u64), (1, 2), (2, 3)] {
        repo.create(
            FlashcardId::new(id),
            &owner,
            MasteryLevel::MIN,
            fixed_now() + Duration::minutes(offset),
        )
        .await
        .unwrap();
    }

    let due = repo
        .due_flashcards(&owner, fixed_now() + Duration::hours(2), 2)
        .await
        .unwrap();
    let ids: Vec<u64> = due.iter().map(|r| r.flashcard_id().value()).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn closed_pool_reports_unavailable() {
    let repo = repo("memdb_closed_pool").await;
    repo.close().await;
    assert!(!repo.is_available());
    let err = repo
        .get(FlashcardId::new(1), &Owner::Anonymous)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable));
}

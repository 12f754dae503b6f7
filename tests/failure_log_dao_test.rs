/// Postgres 上の失敗ログ DAO テスト。`DATABASE_URL` が無ければ何もしない。
use chrono::NaiveDate;
use rand::Rng;
use sqlx::{PgPool, postgres::PgPoolOptions};

use feed_tagger::store::{FailureLogDao, NewFailureLog, PgFailureLogDao};

async fn setup_test_database() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping failure log DAO test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("database connection");
    Some(pool)
}

// 他のテストと衝突しない subject id
fn random_subject_id() -> i64 {
    rand::rng().random_range(1_000_000_000..2_000_000_000)
}

async fn cleanup(pool: &PgPool, subject_id: i64) {
    sqlx::query("DELETE FROM tag_assign_fail_log WHERE subject_id = $1::bigint")
        .bind(subject_id)
        .execute(pool)
        .await
        .expect("cleanup");
}

fn new_entry(subject_id: i64, message: &str) -> NewFailureLog {
    NewFailureLog {
        subject_id,
        message: message.to_string(),
        for_date: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
        error_message: "tag assignment failed after 3 attempts".to_string(),
    }
}

#[tokio::test]
async fn insert_list_and_mark_processed_round_trip() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let dao = PgFailureLogDao::new(pool.clone());
    dao.ensure_schema().await.expect("schema");
    // 2回目も失敗しない
    dao.ensure_schema().await.expect("schema is idempotent");
    let subject_id = random_subject_id();

    let first = dao
        .insert(&new_entry(subject_id, "[이름] 동아리 모집"))
        .await
        .expect("insert first");
    let second = dao
        .insert(&new_entry(subject_id, "행사 안내"))
        .await
        .expect("insert second");

    assert!(first.id < second.id);
    assert_eq!(first.subject_id, subject_id);
    assert_eq!(first.message, "[이름] 동아리 모집");
    assert!(!first.is_processed);

    let pending: Vec<i64> = dao
        .list_unprocessed()
        .await
        .expect("list")
        .into_iter()
        .filter(|entry| entry.subject_id == subject_id)
        .map(|entry| entry.id)
        .collect();
    assert_eq!(pending, vec![first.id, second.id]);

    assert!(dao.mark_processed(first.id).await.expect("mark"));

    let pending: Vec<i64> = dao
        .list_unprocessed()
        .await
        .expect("list")
        .into_iter()
        .filter(|entry| entry.subject_id == subject_id)
        .map(|entry| entry.id)
        .collect();
    assert_eq!(pending, vec![second.id]);

    cleanup(&pool, subject_id).await;
}

#[tokio::test]
async fn marking_unknown_entry_reports_false() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let dao = PgFailureLogDao::new(pool);
    dao.ensure_schema().await.expect("schema");

    assert!(!dao.mark_processed(-42).await.expect("mark"));
}

#[tokio::test]
async fn subject_ids_beyond_i32_range_round_trip() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let dao = PgFailureLogDao::new(pool.clone());
    dao.ensure_schema().await.expect("schema");
    let subject_id = i64::from(i32::MAX) + random_subject_id();

    let inserted = dao
        .insert(&new_entry(subject_id, "행사 안내"))
        .await
        .expect("insert");

    assert_eq!(inserted.subject_id, subject_id);
    let listed: Vec<i64> = dao
        .list_unprocessed()
        .await
        .expect("list")
        .into_iter()
        .filter(|entry| entry.id == inserted.id)
        .map(|entry| entry.subject_id)
        .collect();
    assert_eq!(listed, vec![subject_id]);

    cleanup(&pool, subject_id).await;
}

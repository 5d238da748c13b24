use chrono::{Timelike, Utc};
use coursebase::db::repository::{self, CourseFilter};
use coursebase::error::AppError;
use coursebase::models::{CourseOptions, NewCourseRequest};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn course_request(name: &str) -> NewCourseRequest {
    NewCourseRequest {
        name: name.to_string(),
        source_url: format!("https://example.com/{name}.git"),
        source_backend: None,
        hidden: false,
        hide_after: None,
        hidden_if_registered_after: None,
        spreadsheet_key: None,
    }
}

fn field_errors(err: AppError) -> Vec<String> {
    match err {
        AppError::Validation(errors) => errors.0.into_keys().collect(),
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[tokio::test]
async fn create_applies_defaults_and_persists() {
    let pool = setup_db().await;

    let course = repository::insert_course(&pool, course_request("demo"))
        .await
        .unwrap();
    assert_eq!(course.source_backend, "git");
    assert_eq!(course.cache_version, 0);

    let reloaded = repository::find_course(&pool, course.id).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "demo");
    let by_name = repository::find_course_by_name(&pool, "demo").await.unwrap().unwrap();
    assert_eq!(by_name.id, course.id);
}

#[tokio::test]
async fn invalid_courses_are_rejected_with_field_errors() {
    let pool = setup_db().await;

    let mut req = course_request("demo");
    req.name = "has spaces".to_string();
    req.source_url = String::new();
    let fields = field_errors(repository::insert_course(&pool, req).await.unwrap_err());
    assert_eq!(fields, ["name", "source_url"]);

    let mut req = course_request("demo");
    req.source_backend = Some("svn".to_string());
    let fields = field_errors(repository::insert_course(&pool, req).await.unwrap_err());
    assert_eq!(fields, ["source_backend"]);

    let mut req = course_request("demo");
    req.name = "x".repeat(41);
    assert!(repository::insert_course(&pool, req).await.is_err());

    // Nothing was persisted by the rejected saves.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let pool = setup_db().await;

    repository::insert_course(&pool, course_request("demo")).await.unwrap();
    let fields = field_errors(
        repository::insert_course(&pool, course_request("demo")).await.unwrap_err(),
    );
    assert_eq!(fields, ["name"]);
}

#[tokio::test]
async fn bare_dates_are_normalized_to_day_boundaries() {
    let pool = setup_db().await;

    let mut req = course_request("demo");
    req.hide_after = Some("2024-03-01".to_string());
    req.hidden_if_registered_after = Some("2024-02-01".to_string());
    let course = repository::insert_course(&pool, req).await.unwrap();

    let hide_after = course.hide_after.unwrap();
    assert_eq!(hide_after.date_naive().to_string(), "2024-03-01");
    assert_eq!((hide_after.hour(), hide_after.minute(), hide_after.second()), (23, 59, 59));

    let cutoff = course.hidden_if_registered_after.unwrap();
    assert_eq!(cutoff.to_rfc3339(), "2024-02-01T00:00:00+00:00");

    // Round-trips through the database as a resolved timestamp.
    let reloaded = repository::find_course(&pool, course.id).await.unwrap().unwrap();
    assert_eq!(reloaded.hide_after, course.hide_after);
    assert_eq!(reloaded.hidden_if_registered_after, course.hidden_if_registered_after);
}

#[tokio::test]
async fn unparseable_dates_are_field_errors() {
    let pool = setup_db().await;

    let mut req = course_request("demo");
    req.hide_after = Some("whenever".to_string());
    let fields = field_errors(repository::insert_course(&pool, req).await.unwrap_err());
    assert_eq!(fields, ["hide_after"]);
}

#[tokio::test]
async fn options_update_sets_and_clears_fields() {
    let pool = setup_db().await;

    let course = repository::insert_course(&pool, course_request("demo")).await.unwrap();

    let updated = repository::update_course_options(
        &pool,
        &course,
        CourseOptions {
            hidden: true,
            hide_after: Some("2024-06-01".to_string()),
            hidden_if_registered_after: None,
            spreadsheet_key: Some("sheet123".to_string()),
        },
    )
    .await
    .unwrap();
    assert!(updated.hidden);
    assert!(updated.hide_after.is_some());
    assert_eq!(updated.spreadsheet_key.as_deref(), Some("sheet123"));

    // A blank submission clears the timestamps again.
    let cleared = repository::update_course_options(&pool, &updated, CourseOptions::default())
        .await
        .unwrap();
    assert!(!cleared.hidden);
    assert_eq!(cleared.hide_after, None);
    assert_eq!(cleared.spreadsheet_key, None);
}

#[tokio::test]
async fn ongoing_and_expired_partition_courses() {
    let pool = setup_db().await;

    let mut req = course_request("past");
    req.hide_after = Some("2000-01-01".to_string());
    repository::insert_course(&pool, req).await.unwrap();
    let mut req = course_request("future");
    req.hide_after = Some("2999-01-01".to_string());
    repository::insert_course(&pool, req).await.unwrap();
    repository::insert_course(&pool, course_request("open")).await.unwrap();

    let now = Utc::now();
    let names = |courses: Vec<coursebase::models::Course>| {
        courses.into_iter().map(|c| c.name).collect::<Vec<_>>()
    };

    let ongoing = repository::fetch_courses(&pool, CourseFilter::Ongoing, now).await.unwrap();
    assert_eq!(names(ongoing), ["future", "open"]);

    let expired = repository::fetch_courses(&pool, CourseFilter::Expired, now).await.unwrap();
    assert_eq!(names(expired), ["past"]);

    let all = repository::fetch_courses(&pool, CourseFilter::All, now).await.unwrap();
    assert_eq!(names(all), ["future", "open", "past"]);
}

#[tokio::test]
async fn submission_times_track_first_and_last() {
    let pool = setup_db().await;

    let course = repository::insert_course(&pool, course_request("demo")).await.unwrap();
    let user = repository::insert_user(&pool, "alice", false).await.unwrap();

    assert_eq!(repository::time_of_first_submission(&pool, course.id).await.unwrap(), None);

    let t1 = coursebase::timeutil::to_time("2024-01-01 10:00:00", false).unwrap().unwrap();
    let t2 = coursebase::timeutil::to_time("2024-02-01 10:00:00", false).unwrap().unwrap();
    repository::insert_submission(&pool, course.id, None, user.id, t2).await.unwrap();
    repository::insert_submission(&pool, course.id, None, user.id, t1).await.unwrap();

    let first = repository::time_of_first_submission(&pool, course.id).await.unwrap();
    let last = repository::time_of_last_submission(&pool, course.id).await.unwrap();
    assert_eq!(first, Some(t1));
    assert_eq!(last, Some(t2));
}

#[tokio::test]
async fn destroy_bulk_deletes_every_dependent_row() {
    let pool = setup_db().await;

    let doomed = repository::insert_course(&pool, course_request("doomed")).await.unwrap();
    let kept = repository::insert_course(&pool, course_request("kept")).await.unwrap();
    let user = repository::insert_user(&pool, "alice", false).await.unwrap();

    for course in [&doomed, &kept] {
        let ex = repository::insert_exercise(&pool, course.id, "algo-1", None, None)
            .await
            .unwrap();
        repository::insert_available_point(&pool, ex.id, "p1").await.unwrap();
        repository::award_point(&pool, course.id, user.id, "p1", None).await.unwrap();
        repository::insert_submission(&pool, course.id, Some(ex.id), user.id, Utc::now())
            .await
            .unwrap();
        let question_id = sqlx::query(
            "INSERT INTO feedback_questions (course_id, question) VALUES (?, 'How was it?')",
        )
        .bind(course.id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query("INSERT INTO feedback_answers (feedback_question_id, answer) VALUES (?, 'fine')")
            .bind(question_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO student_events (course_id, user_id, event_type, created_at) \
             VALUES (?, ?, 'open', ?)",
        )
        .bind(course.id)
        .bind(user.id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO test_scanner_cache_entries (course_id, files_hash, value) \
             VALUES (?, 'abc', 'cached')",
        )
        .bind(course.id)
        .execute(&pool)
        .await
        .unwrap();
    }

    repository::destroy_course(&pool, doomed.id).await.unwrap();

    assert!(repository::find_course(&pool, doomed.id).await.unwrap().is_none());

    // Every dependent table is clear of the destroyed course but keeps the
    // other course's rows.
    for table in [
        "exercises",
        "awarded_points",
        "submissions",
        "feedback_questions",
        "student_events",
        "test_scanner_cache_entries",
    ] {
        let remaining: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE course_id = ?"))
                .bind(doomed.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0, "{table} still has rows for the destroyed course");

        let kept_rows: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE course_id = ?"))
                .bind(kept.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(kept_rows, 1, "{table} lost rows of the surviving course");
    }

    let orphan_points: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM available_points WHERE exercise_id NOT IN (SELECT id FROM exercises)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphan_points, 0);

    let orphan_answers: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM feedback_answers \
         WHERE feedback_question_id NOT IN (SELECT id FROM feedback_questions)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphan_answers, 0);
}

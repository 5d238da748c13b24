use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, ValidationErrors};
use crate::models::{AvailablePoint, AwardedPoint, Course, CourseOptions, Exercise, NewCourseRequest, User};
use crate::timeutil;

const COURSE_COLUMNS: &str = "id, name, source_url, source_backend, hidden, hide_after, \
     hidden_if_registered_after, spreadsheet_key, cache_version, created_at, updated_at";

const EXERCISE_COLUMNS: &str = "id, course_id, name, deadline, publish_time, \
     solution_visible_after, deleted, disabled, created_at, updated_at";

pub async fn find_user(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, login, administrator, guest, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn insert_user(
    db: &SqlitePool,
    login: &str,
    administrator: bool,
) -> Result<User, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO users (login, administrator, guest, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(login)
    .bind(administrator)
    .bind(now)
    .execute(db)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        login: login.to_string(),
        administrator,
        guest: false,
        created_at: now,
    })
}

/// Validates and saves a new course. Defaults are applied before validation
/// runs, all field errors are collected into one response, and nothing is
/// written unless every check passes.
pub async fn insert_course(db: &SqlitePool, req: NewCourseRequest) -> Result<Course, AppError> {
    let source_backend = req.source_backend_or_default().to_string();
    let mut errors = req.validate();

    let name_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM courses WHERE name = ?)")
            .bind(&req.name)
            .fetch_one(db)
            .await?;
    if name_taken {
        errors.add("name", "has already been taken");
    }

    let hide_after = parse_time_field(&mut errors, "hide_after", req.hide_after.as_deref(), true);
    let hidden_if_registered_after = parse_time_field(
        &mut errors,
        "hidden_if_registered_after",
        req.hidden_if_registered_after.as_deref(),
        false,
    );

    errors.into_result()?;

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO courses \
            (name, source_url, source_backend, hidden, hide_after, \
            hidden_if_registered_after, spreadsheet_key, cache_version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&req.name)
    .bind(&req.source_url)
    .bind(&source_backend)
    .bind(req.hidden)
    .bind(hide_after)
    .bind(hidden_if_registered_after)
    .bind(&req.spreadsheet_key)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(Course {
        id: result.last_insert_rowid(),
        name: req.name,
        source_url: req.source_url,
        source_backend,
        hidden: req.hidden,
        hide_after,
        hidden_if_registered_after,
        spreadsheet_key: req.spreadsheet_key,
        cache_version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Timestamps are stored fully resolved, never as bare dates: hide-after
/// rounds a bare date up to the end of the day, the registration cutoff
/// down to its start. Unparseable input becomes a field error.
fn parse_time_field(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    prefer_end_of_day: bool,
) -> Option<DateTime<Utc>> {
    match timeutil::to_time(value.unwrap_or(""), prefer_end_of_day) {
        Ok(t) => t,
        Err(_) => {
            errors.add(field, "is not a valid date or time");
            None
        }
    }
}

pub async fn find_course(db: &SqlitePool, id: i64) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_course_by_name(db: &SqlitePool, name: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE name = ?"))
        .bind(name)
        .fetch_optional(db)
        .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseFilter {
    All,
    /// Not yet past their hide-after time.
    Ongoing,
    /// Past their hide-after time.
    Expired,
}

pub async fn fetch_courses(
    db: &SqlitePool,
    filter: CourseFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Course>, sqlx::Error> {
    let condition = match filter {
        CourseFilter::All => "1 = 1",
        CourseFilter::Ongoing => "(hide_after IS NULL OR hide_after > ?)",
        CourseFilter::Expired => "(hide_after IS NOT NULL AND hide_after <= ?)",
    };
    let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE {condition} ORDER BY name");
    let mut query = sqlx::query_as::<_, Course>(&sql);
    if filter != CourseFilter::All {
        query = query.bind(now);
    }
    query.fetch_all(db).await
}

pub async fn update_course_options(
    db: &SqlitePool,
    course: &Course,
    options: CourseOptions,
) -> Result<Course, AppError> {
    let mut errors = ValidationErrors::default();
    let hide_after = parse_time_field(&mut errors, "hide_after", options.hide_after.as_deref(), true);
    let hidden_if_registered_after = parse_time_field(
        &mut errors,
        "hidden_if_registered_after",
        options.hidden_if_registered_after.as_deref(),
        false,
    );
    errors.into_result()?;

    let now = Utc::now();
    sqlx::query(
        "UPDATE courses SET hidden = ?, hide_after = ?, hidden_if_registered_after = ?, \
         spreadsheet_key = ?, updated_at = ? WHERE id = ?",
    )
    .bind(options.hidden)
    .bind(hide_after)
    .bind(hidden_if_registered_after)
    .bind(&options.spreadsheet_key)
    .bind(now)
    .bind(course.id)
    .execute(db)
    .await?;

    find_course(db, course.id).await?.ok_or(AppError::NotFound)
}

pub async fn bump_cache_version(db: &SqlitePool, course_id: i64, new_version: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE courses SET cache_version = ?, updated_at = ? WHERE id = ?")
        .bind(new_version)
        .bind(Utc::now())
        .bind(course_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Deletes a course and every row referencing it as one transaction of
/// bulk deletes. Dependent tables are cleared with single set-based
/// statements; per-row deletion does not scale to real award tables.
/// On-disk cache removal is the caller's step, after this commits.
pub async fn destroy_course(db: &SqlitePool, course_id: i64) -> Result<(), AppError> {
    let mut tx = db.begin().await?;
    let statements = [
        "DELETE FROM awarded_points WHERE course_id = ?",
        "DELETE FROM available_points WHERE exercise_id IN \
            (SELECT id FROM exercises WHERE course_id = ?)",
        "DELETE FROM submissions WHERE course_id = ?",
        "DELETE FROM feedback_answers WHERE feedback_question_id IN \
            (SELECT id FROM feedback_questions WHERE course_id = ?)",
        "DELETE FROM feedback_questions WHERE course_id = ?",
        "DELETE FROM student_events WHERE course_id = ?",
        "DELETE FROM test_scanner_cache_entries WHERE course_id = ?",
        "DELETE FROM exercises WHERE course_id = ?",
        "DELETE FROM courses WHERE id = ?",
    ];
    for sql in statements {
        sqlx::query(sql).bind(course_id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn fetch_exercises(db: &SqlitePool, course_id: i64) -> Result<Vec<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises WHERE course_id = ? ORDER BY name"
    ))
    .bind(course_id)
    .fetch_all(db)
    .await
}

/// Available point names for every exercise of the course, keyed by
/// exercise id. One query for the whole listing.
pub async fn available_points_by_exercise(
    db: &SqlitePool,
    course_id: i64,
) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT available_points.exercise_id, available_points.name \
         FROM available_points \
         JOIN exercises ON exercises.id = available_points.exercise_id \
         WHERE exercises.course_id = ? \
         ORDER BY available_points.name",
    )
    .bind(course_id)
    .fetch_all(db)
    .await?;

    let mut by_exercise: HashMap<i64, Vec<String>> = HashMap::new();
    for (exercise_id, name) in rows {
        by_exercise.entry(exercise_id).or_default().push(name);
    }
    Ok(by_exercise)
}

pub async fn insert_exercise(
    db: &SqlitePool,
    course_id: i64,
    name: &str,
    deadline: Option<DateTime<Utc>>,
    publish_time: Option<DateTime<Utc>>,
) -> Result<Exercise, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO exercises \
            (course_id, name, deadline, publish_time, solution_visible_after, \
            deleted, disabled, created_at, updated_at) \
         VALUES (?, ?, ?, ?, NULL, 0, 0, ?, ?)",
    )
    .bind(course_id)
    .bind(name)
    .bind(deadline)
    .bind(publish_time)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(Exercise {
        id: result.last_insert_rowid(),
        course_id,
        name: name.to_string(),
        deadline,
        publish_time,
        solution_visible_after: None,
        deleted: false,
        disabled: false,
        created_at: now,
        updated_at: now,
    })
}

pub async fn insert_available_point(
    db: &SqlitePool,
    exercise_id: i64,
    name: &str,
) -> Result<AvailablePoint, sqlx::Error> {
    let result = sqlx::query("INSERT INTO available_points (exercise_id, name) VALUES (?, ?)")
        .bind(exercise_id)
        .bind(name)
        .execute(db)
        .await?;

    Ok(AvailablePoint {
        id: result.last_insert_rowid(),
        exercise_id,
        name: name.to_string(),
    })
}

/// Records that a user earned a named point. The unique
/// (course_id, user_id, name) index makes double-awarding a database
/// error rather than a duplicate row.
pub async fn award_point(
    db: &SqlitePool,
    course_id: i64,
    user_id: i64,
    name: &str,
    submission_id: Option<i64>,
) -> Result<AwardedPoint, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO awarded_points (course_id, user_id, name, submission_id) VALUES (?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(user_id)
    .bind(name)
    .bind(submission_id)
    .execute(db)
    .await?;

    Ok(AwardedPoint {
        id: result.last_insert_rowid(),
        course_id,
        user_id,
        name: name.to_string(),
        submission_id,
    })
}

pub async fn insert_submission(
    db: &SqlitePool,
    course_id: i64,
    exercise_id: Option<i64>,
    user_id: i64,
    created_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO submissions (course_id, exercise_id, user_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(exercise_id)
    .bind(user_id)
    .bind(created_at)
    .bind(created_at)
    .execute(db)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn time_of_first_submission(
    db: &SqlitePool,
    course_id: i64,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT created_at FROM submissions WHERE course_id = ? ORDER BY created_at ASC LIMIT 1",
    )
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn time_of_last_submission(
    db: &SqlitePool,
    course_id: i64,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT created_at FROM submissions WHERE course_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(course_id)
    .fetch_optional(db)
    .await
}

use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::repository::{self, CourseFilter};
use crate::error::AppError;
use crate::models::{Course, CourseOptions, ExerciseRecord, NewCourseRequest, User};
use crate::services::{self, RefreshOutcome};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/{id}", get(show_course).delete(destroy_course))
        .route("/courses/by-name/{name}", get(show_course_by_name))
        .route("/courses/{id}/options", patch(patch_course_options))
        .route("/courses/{id}/exercises", get(list_exercises))
        .route("/courses/{id}/points", get(course_points))
        .route("/courses/{id}/refresh", post(refresh_course))
        .route("/courses/{id}/submission-times", get(submission_times))
        .with_state(state)
}

/// Resolves the caller from the optional `X-User-Id` header. The real
/// authentication subsystem lives in front of this service; an absent
/// header is an anonymous guest.
async fn current_user(db: &SqlitePool, headers: &HeaderMap) -> Result<User, AppError> {
    let Some(value) = headers.get("x-user-id") else {
        return Ok(User::guest(Utc::now()));
    };
    let id: i64 = value
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::BadRequest("X-User-Id must be an integer".to_string()))?;
    repository::find_user(db, id).await?.ok_or(AppError::NotFound)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct CourseListParams {
    status: Option<String>,
}

async fn list_courses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CourseListParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let filter = match params.status.as_deref() {
        None | Some("all") => CourseFilter::All,
        Some("ongoing") => CourseFilter::Ongoing,
        Some("expired") => CourseFilter::Expired,
        Some(other) => {
            return Err(AppError::BadRequest(format!("unknown status filter: {other}")));
        }
    };
    let user = current_user(&state.db, &headers).await?;
    let now = Utc::now();
    let courses = repository::fetch_courses(&state.db, filter, now)
        .await?
        .into_iter()
        .filter(|c| c.visible_to(&user, now))
        .collect();
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<NewCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let course = repository::insert_course(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Loads a course and applies the visibility rules; a course the caller
/// may not see is indistinguishable from a missing one.
async fn visible_course(
    db: &SqlitePool,
    headers: &HeaderMap,
    id: i64,
) -> Result<(Course, User, DateTime<Utc>), AppError> {
    let user = current_user(db, headers).await?;
    let now = Utc::now();
    let course = repository::find_course(db, id).await?.ok_or(AppError::NotFound)?;
    if !course.visible_to(&user, now) {
        return Err(AppError::NotFound);
    }
    Ok((course, user, now))
}

async fn show_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Course>, AppError> {
    let (course, _, _) = visible_course(&state.db, &headers, id).await?;
    Ok(Json(course))
}

async fn show_course_by_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Course>, AppError> {
    let user = current_user(&state.db, &headers).await?;
    let now = Utc::now();
    let course = repository::find_course_by_name(&state.db, &name)
        .await?
        .ok_or(AppError::NotFound)?;
    if !course.visible_to(&user, now) {
        return Err(AppError::NotFound);
    }
    Ok(Json(course))
}

async fn destroy_course(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let course = repository::find_course(&state.db, id).await?.ok_or(AppError::NotFound)?;

    // All dependent rows go in one transaction; the on-disk cache is
    // removed only once that has committed.
    repository::destroy_course(&state.db, course.id).await?;
    let paths = state.store.paths(&course.name, course.cache_version)?;
    state.store.delete_cache(&paths).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn patch_course_options(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(options): Json<CourseOptions>,
) -> Result<Json<Course>, AppError> {
    let course = repository::find_course(&state.db, id).await?.ok_or(AppError::NotFound)?;
    let updated = repository::update_course_options(&state.db, &course, options).await?;
    Ok(Json(updated))
}

async fn list_exercises(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ExerciseRecord>>, AppError> {
    let (course, user, now) = visible_course(&state.db, &headers, id).await?;
    let exercises = repository::fetch_exercises(&state.db, course.id).await?;
    let mut points = repository::available_points_by_exercise(&state.db, course.id).await?;
    let records = exercises
        .into_iter()
        .filter(|e| e.visible_to(&course, &user, now))
        .map(|e| {
            let available = points.remove(&e.id).unwrap_or_default();
            ExerciseRecord::new(e, &user, available)
        })
        .collect();
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
struct GroupCompletionRecord {
    group_name: String,
    available_point_count: i64,
    points_by_user: HashMap<i64, i64>,
}

async fn course_points(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<GroupCompletionRecord>>, AppError> {
    let (course, _, _) = visible_course(&state.db, &headers, id).await?;
    let completion = services::completion_by_group(&state.db, course.id).await?;
    let mut records: Vec<GroupCompletionRecord> = completion
        .into_iter()
        .map(|(group_name, group)| GroupCompletionRecord {
            group_name,
            available_point_count: group.available_point_count,
            points_by_user: group.points_by_user,
        })
        .collect();
    // Iteration order of the aggregation is unspecified; sort for stable
    // presentation.
    records.sort_by(|a, b| a.group_name.cmp(&b.group_name));
    Ok(Json(records))
}

#[derive(Deserialize)]
struct RefreshParams {
    timeout_secs: Option<u64>,
}

async fn refresh_course(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshOutcome>, AppError> {
    let course = repository::find_course(&state.db, id).await?.ok_or(AppError::NotFound)?;
    let deadline = params.timeout_secs.map(Duration::from_secs);
    let outcome = state.refresh.refresh_course(&course, deadline).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct SubmissionTimes {
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

async fn submission_times(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionTimes>, AppError> {
    let (course, _, _) = visible_course(&state.db, &headers, id).await?;
    let first = repository::time_of_first_submission(&state.db, course.id).await?;
    let last = repository::time_of_last_submission(&state.db, course.id).await?;
    Ok(Json(SubmissionTimes { first, last }))
}

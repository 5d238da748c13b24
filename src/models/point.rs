use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A point name an exercise can award, defined by the course material.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailablePoint {
    pub id: i64,
    pub exercise_id: i64,
    pub name: String,
}

/// A point a user has earned. Unique per (course, user, name): awarding the
/// same point twice is a conflict, not a second row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AwardedPoint {
    pub id: i64,
    pub course_id: i64,
    pub user_id: i64,
    pub name: String,
    pub submission_id: Option<i64>,
}

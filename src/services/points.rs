use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::AppError;
use crate::models::split_group;

/// Escape character used in LIKE patterns built from exercise group names.
const LIKE_ESCAPE: char = '!';

/// Completion figures for one exercise group. Users who earned nothing in
/// the group are absent from `points_by_user`, never present as zero.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GroupCompletion {
    pub available_point_count: i64,
    pub points_by_user: HashMap<i64, i64>,
}

/// Aggregates awarded points into per-exercise-group completion counts.
///
/// Groups are derived from the course's exercise names; for each group the
/// available point names are resolved by matching exercise names against
/// `<group>-%` (with pattern metacharacters escaped, so a group name is
/// always a literal), and award counts are grouped by user over that name
/// set. Groups whose pattern matches no available points are omitted.
/// Query failures propagate; an empty mapping only ever means "no data".
pub async fn completion_by_group(
    db: &SqlitePool,
    course_id: i64,
) -> Result<HashMap<String, GroupCompletion>, AppError> {
    let exercise_names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM exercises WHERE course_id = ?")
            .bind(course_id)
            .fetch_all(db)
            .await?;

    let groups: BTreeSet<&str> = exercise_names
        .iter()
        .map(|name| split_group(name).group)
        .collect();

    let mut result = HashMap::new();
    for group in groups {
        let pattern = format!("{}-%", escape_like(group));
        let point_names: Vec<String> = sqlx::query_scalar(
            "SELECT available_points.name \
             FROM exercises \
             JOIN available_points ON available_points.exercise_id = exercises.id \
             WHERE exercises.course_id = ? AND exercises.name LIKE ? ESCAPE '!'",
        )
        .bind(course_id)
        .bind(&pattern)
        .fetch_all(db)
        .await?;

        if point_names.is_empty() {
            continue;
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT user_id, COUNT(*) FROM awarded_points WHERE course_id = ",
        );
        query.push_bind(course_id);
        query.push(" AND name IN (");
        let mut names = query.separated(", ");
        for name in &point_names {
            names.push_bind(name);
        }
        names.push_unseparated(") GROUP BY user_id");

        let counts: Vec<(i64, i64)> = query.build_query_as().fetch_all(db).await?;

        result.insert(
            group.to_string(),
            GroupCompletion {
                available_point_count: point_names.len() as i64,
                points_by_user: counts.into_iter().collect(),
            },
        );
    }
    Ok(result)
}

/// Neutralizes `%`, `_` and the escape character itself so a group name
/// participates in a LIKE pattern as a literal string.
pub fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

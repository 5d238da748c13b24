use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{Course, User};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exercise {
    pub id: i64,
    pub course_id: i64,
    pub name: String,
    pub deadline: Option<DateTime<Utc>>,
    pub publish_time: Option<DateTime<Utc>>,
    pub solution_visible_after: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exercise {
    pub fn group(&self) -> &str {
        split_group(&self.name).group
    }

    /// The deadline in effect for this user. Per-user overrides (extensions
    /// granted by instructors) are resolved by an external collaborator;
    /// until one is wired in, every user gets the exercise deadline. Total:
    /// never fails, absent deadline means none.
    pub fn deadline_for(&self, _user: &User) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// An exercise is shown when its course is, it has not been removed
    /// from the source repository, and its publish time has passed.
    /// Administrators see unpublished exercises.
    pub fn visible_to(&self, course: &Course, user: &User, now: DateTime<Utc>) -> bool {
        course.visible_to(user, now)
            && !self.deleted
            && (user.administrator || self.publish_time.is_none_or(|t| t <= now))
    }
}

/// An exercise name split at the last dash: `"algo-week1"` groups under
/// `"algo"`, a name without a dash belongs to the unnamed group `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameParts<'a> {
    pub group: &'a str,
    pub leaf: &'a str,
}

/// Derives the grouping key from an exercise name. Pure and total; the
/// result is the aggregation key for point completion, so the same name
/// always yields the same group.
pub fn split_group(name: &str) -> NameParts<'_> {
    match name.rfind('-') {
        Some(i) if i > 0 && i + 1 < name.len() => NameParts {
            group: &name[..i],
            leaf: &name[i + 1..],
        },
        _ => NameParts { group: "", leaf: name },
    }
}

/// Per-exercise record handed to the presentation layer.
#[derive(Debug, Serialize)]
pub struct ExerciseRecord {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub publish_time: Option<DateTime<Utc>>,
    pub solution_visible_after: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub available_points: Vec<String>,
}

impl ExerciseRecord {
    pub fn new(exercise: Exercise, user: &User, available_points: Vec<String>) -> Self {
        Self {
            id: exercise.id,
            deadline: exercise.deadline_for(user),
            name: exercise.name,
            created_at: exercise.created_at,
            updated_at: exercise.updated_at,
            publish_time: exercise.publish_time,
            solution_visible_after: exercise.solution_visible_after,
            disabled: exercise.disabled,
            available_points,
        }
    }
}

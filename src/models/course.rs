use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::ValidationErrors;
use crate::models::User;

pub const VALID_SOURCE_BACKENDS: &[&str] = &["git"];
pub const DEFAULT_SOURCE_BACKEND: &str = "git";

pub const MAX_NAME_LENGTH: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub source_url: String,
    pub source_backend: String,
    pub hidden: bool,
    pub hide_after: Option<DateTime<Utc>>,
    pub hidden_if_registered_after: Option<DateTime<Utc>>,
    pub spreadsheet_key: Option<String>,
    pub cache_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Whether the course (and by extension its exercises) is shown to the
    /// given user at the given time. Administrators see everything; others
    /// see the course unless it is hidden outright, past its hide-after
    /// time, or hidden from users who registered after a cutoff.
    pub fn visible_to(&self, user: &User, now: DateTime<Utc>) -> bool {
        user.administrator
            || (!self.hidden
                && self.hide_after.is_none_or(|t| t > now)
                && self
                    .hidden_if_registered_after
                    .is_none_or(|t| !user.guest && t > user.created_at))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub name: String,
    pub source_url: String,
    pub source_backend: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    pub hide_after: Option<String>,
    pub hidden_if_registered_after: Option<String>,
    pub spreadsheet_key: Option<String>,
}

impl NewCourseRequest {
    /// Applies the default source backend when none was given. Runs before
    /// validation, so an absent backend validates as the default rather
    /// than as missing.
    pub fn source_backend_or_default(&self) -> &str {
        self.source_backend.as_deref().unwrap_or(DEFAULT_SOURCE_BACKEND)
    }

    /// Field-scoped checks that need no database access. Uniqueness of the
    /// name is checked by the repository inside the same save.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        validate_name(&self.name, &mut errors);
        if self.source_url.trim().is_empty() {
            errors.add("source_url", "can't be blank");
        }
        let backend = self.source_backend_or_default();
        if !VALID_SOURCE_BACKENDS.contains(&backend) {
            errors.add(
                "source_backend",
                format!("must be one of [{}]", VALID_SOURCE_BACKENDS.join(", ")),
            );
        }
        errors
    }
}

fn validate_name(name: &str, errors: &mut ValidationErrors) {
    if name.is_empty() {
        errors.add("name", "can't be blank");
        return;
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        errors.add("name", format!("is too long (maximum is {MAX_NAME_LENGTH} characters)"));
    }
    if name.chars().any(char::is_whitespace) {
        errors.add("name", "should not contain white spaces");
    }
    // The name becomes a cache directory component, so path-unsafe
    // characters are rejected here as well, not only at the path resolver.
    if name == "." || name == ".." || name.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        errors.add("name", "contains characters not allowed in a course name");
    }
}

/// Updatable presentation options. An absent or blank timestamp clears the
/// field; `hidden` always takes the submitted value (absent means false).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseOptions {
    #[serde(default)]
    pub hidden: bool,
    pub hide_after: Option<String>,
    pub hidden_if_registered_after: Option<String>,
    pub spreadsheet_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn course() -> Course {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Course {
            id: 1,
            name: "demo".to_string(),
            source_url: "https://example.com/demo.git".to_string(),
            source_backend: "git".to_string(),
            hidden: false,
            hide_after: None,
            hidden_if_registered_after: None,
            spreadsheet_key: None,
            cache_version: 0,
            created_at: t,
            updated_at: t,
        }
    }

    fn student(registered: DateTime<Utc>) -> User {
        User {
            id: 7,
            login: "student".to_string(),
            administrator: false,
            guest: false,
            created_at: registered,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn visible_without_restrictions() {
        let user = student(at(2024, 1, 2));
        assert!(course().visible_to(&user, at(2030, 1, 1)));
    }

    #[test]
    fn hidden_flag_hides_from_students_but_not_admins() {
        let mut c = course();
        c.hidden = true;
        let user = student(at(2024, 1, 2));
        let mut admin = student(at(2024, 1, 2));
        admin.administrator = true;
        assert!(!c.visible_to(&user, at(2024, 2, 1)));
        assert!(c.visible_to(&admin, at(2024, 2, 1)));
    }

    #[test]
    fn hide_after_gates_on_now() {
        let mut c = course();
        c.hide_after = Some(at(2024, 6, 1));
        let user = student(at(2024, 1, 2));
        assert!(c.visible_to(&user, at(2024, 5, 31)));
        assert!(!c.visible_to(&user, at(2024, 6, 1)));
        assert!(!c.visible_to(&user, at(2024, 6, 2)));
    }

    #[test]
    fn registration_cutoff_hides_late_registrants_and_guests() {
        let mut c = course();
        c.hidden_if_registered_after = Some(at(2024, 3, 1));
        let early = student(at(2024, 2, 1));
        let late = student(at(2024, 4, 1));
        let guest = User::guest(at(2024, 2, 1));
        assert!(c.visible_to(&early, at(2024, 5, 1)));
        assert!(!c.visible_to(&late, at(2024, 5, 1)));
        assert!(!c.visible_to(&guest, at(2024, 5, 1)));
    }

    #[test]
    fn name_validation() {
        let mut req = NewCourseRequest {
            name: "ok-course".to_string(),
            source_url: "https://example.com/x.git".to_string(),
            source_backend: None,
            hidden: false,
            hide_after: None,
            hidden_if_registered_after: None,
            spreadsheet_key: None,
        };
        assert!(req.validate().is_empty());
        assert_eq!(req.source_backend_or_default(), "git");

        req.name = "has space".to_string();
        assert!(!req.validate().is_empty());

        req.name = "x".repeat(41);
        assert!(!req.validate().is_empty());

        req.name = "a/b".to_string();
        assert!(!req.validate().is_empty());

        req.name = String::new();
        assert!(!req.validate().is_empty());

        req.name = "fine".to_string();
        req.source_backend = Some("svn".to_string());
        assert!(!req.validate().is_empty());
    }
}

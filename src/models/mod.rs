pub mod course;
pub mod exercise;
pub mod point;
pub mod user;

pub use course::{Course, CourseOptions, NewCourseRequest};
pub use exercise::{Exercise, ExerciseRecord, NameParts, split_group};
pub use point::{AvailablePoint, AwardedPoint};
pub use user::User;

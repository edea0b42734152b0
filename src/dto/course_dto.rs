use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::course::{Course, Lesson, LessonKind};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCoursePayload {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    pub description: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLessonPayload {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    pub kind: LessonKind,
    pub content: Option<String>,
    #[validate(range(min = 0))]
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

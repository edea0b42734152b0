use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::course_dto::{CourseDetail, CreateCoursePayload, CreateLessonPayload};
use crate::error::{Error, Result};
use crate::models::course::{Course, Lesson};
use crate::models::progress::CourseProgress;
use crate::models::user::Role;

#[derive(Clone)]
pub struct CourseService {
    pool: PgPool,
}

impl CourseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Staff see every course, students only published ones.
    pub async fn list_courses(&self, include_unpublished: bool) -> Result<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>(
            r#"
            SELECT * FROM courses
            WHERE ($1 OR is_published)
            ORDER BY created_at DESC
            "#,
        )
        .bind(include_unpublished)
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    pub async fn get_course(&self, course_id: Uuid) -> Result<Course> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Course not found".to_string()))
    }

    pub async fn get_course_detail(&self, course_id: Uuid) -> Result<CourseDetail> {
        let course = self.get_course(course_id).await?;
        let lessons = self.list_lessons(course_id).await?;
        Ok(CourseDetail { course, lessons })
    }

    pub async fn create_course(&self, payload: CreateCoursePayload, teacher_id: Uuid) -> Result<Course> {
        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (title, description, teacher_id, is_published)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(teacher_id)
        .bind(payload.is_published.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(course_id = %course.id, teacher_id = %teacher_id, "course created");
        Ok(course)
    }

    pub async fn list_lessons(&self, course_id: Uuid) -> Result<Vec<Lesson>> {
        let lessons = sqlx::query_as::<_, Lesson>(
            "SELECT * FROM lessons WHERE course_id = $1 ORDER BY position, created_at",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lessons)
    }

    /// Appends the lesson when no position is given.
    pub async fn create_lesson(
        &self,
        course_id: Uuid,
        payload: CreateLessonPayload,
        actor_id: Uuid,
        actor_role: Role,
    ) -> Result<Lesson> {
        let course = self.get_course(course_id).await?;
        if actor_role != Role::Admin && course.teacher_id != actor_id {
            return Err(Error::Forbidden("Only the course teacher can add lessons".to_string()));
        }

        let lesson = sqlx::query_as::<_, Lesson>(
            r#"
            INSERT INTO lessons (course_id, title, kind, content, position)
            VALUES (
                $1, $2, $3, $4,
                COALESCE($5, (SELECT COALESCE(MAX(position) + 1, 0) FROM lessons WHERE course_id = $1))
            )
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(&payload.title)
        .bind(payload.kind.as_str())
        .bind(&payload.content)
        .bind(payload.position)
        .fetch_one(&self.pool)
        .await?;

        Ok(lesson)
    }

    pub async fn student_progress(&self, course_id: Uuid, student_id: Uuid) -> Result<Vec<CourseProgress>> {
        let progress = sqlx::query_as::<_, CourseProgress>(
            r#"
            SELECT p.* FROM course_progress p
            JOIN lessons l ON l.id = p.lesson_id
            WHERE p.course_id = $1 AND p.student_id = $2
            ORDER BY l.position
            "#,
        )
        .bind(course_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(progress)
    }
}

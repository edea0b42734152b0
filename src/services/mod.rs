pub mod attempt_runner;
pub mod attempt_service;
pub mod attempt_session;
pub mod auth_service;
pub mod course_service;
pub mod grading_service;
pub mod message_service;
pub mod reward_service;
pub mod shop_service;
pub mod test_service;

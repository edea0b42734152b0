pub mod attempt_dto;
pub mod auth_dto;
pub mod chat_dto;
pub mod course_dto;
pub mod shop_dto;
pub mod test_dto;

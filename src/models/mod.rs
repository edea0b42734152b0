pub mod attempt;
pub mod course;
pub mod message;
pub mod progress;
pub mod question;
pub mod shop;
pub mod user;

pub mod approval;
pub mod booking;
pub mod category;
pub mod claim;
pub mod notification;
pub mod outbox;
pub mod role;
pub mod session;
pub mod user;
pub mod workflow_config;

pub mod activity;
pub mod campaign;
pub mod notification;
pub mod token;

pub mod chat;
pub mod frame;
pub mod payment_order;
pub mod project;
pub mod user;

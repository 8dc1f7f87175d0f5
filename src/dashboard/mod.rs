pub mod server;
pub mod models;
pub mod dashboard_messages;
pub mod dashboard_status;

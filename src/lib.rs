pub mod dispatch;
pub mod errors;

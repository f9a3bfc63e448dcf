pub mod alert;
pub mod config;
pub mod frame;
pub mod gesture;
pub mod landmark;

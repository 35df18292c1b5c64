pub mod control_handler;
pub mod controller;

pub mod arg_parser;
pub mod config_store;
pub mod control_loop;
pub mod fan_curve;
pub mod hardware;
pub mod lifecycle_manager;
pub mod logger;
pub mod settings;

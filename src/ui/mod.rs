pub mod config_ui;
pub mod render;

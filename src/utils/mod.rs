pub mod logging;
pub mod config_loader;

pub mod settings;
pub mod upstream;
pub mod cache;
pub mod service;
pub mod proc_loader;
pub mod proc_initiator;
pub mod proc_validator;

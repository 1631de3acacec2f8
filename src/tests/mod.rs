pub mod common;
pub mod http_upstream;
pub mod server_routes;
pub mod scheduler;

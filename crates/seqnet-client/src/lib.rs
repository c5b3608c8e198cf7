pub mod client;
pub mod rest_api;
pub mod shell;

pub use client::Client;
pub use shell::Shell;

//! Wallet background service: the request dispatcher, approval queues and
//! signing pipeline behind the extension popup and injected dApp pages.

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod password_cache;
pub mod port;
pub mod registry;
pub mod server;
pub mod state;
pub mod subscription;
pub mod types;
pub mod window;

pub use error::{Error, Result};
pub use handlers::Background;

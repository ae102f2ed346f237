pub mod handler;
pub mod types;

pub use handler::websocket_handler;
pub use types::*;

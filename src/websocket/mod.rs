pub mod error;
pub mod handler;

pub use error::HandshakeError;
pub use handler::websocket_handler;

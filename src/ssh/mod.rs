pub mod channel;
pub mod handler;
pub mod keys;
pub mod payload;
pub mod session;
pub mod transport;
pub mod wire;

#![forbid(unsafe_code)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod proto;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod ticket;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the pieces clients and tests touch most.
pub use crate::proto::{COOKIE_LEN, MAX_DATAGRAM, Message, decode, encode};
pub use crate::server::Server;
pub use crate::store::Store;
pub use crate::ticket::{TICKET_CODE_LEN, ticket_code};

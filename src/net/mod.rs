//! Stream transports.
#[cfg(feature = "tokio")]
mod socket;

#[cfg(feature = "tokio")]
pub use socket::Socket;

//! Client-side engine for the PostgreSQL v3 frontend/backend protocol.
//!
//! `postwire` speaks bytes to a postgres server over any stream transport:
//! it frames backend messages, drives the extended-query state machine
//! (Parse / Bind / Describe / Execute / Sync / Close), and converts between
//! [`Value`]s and the postgres binary wire formats for the built-in scalar,
//! array, composite and range types.
//!
//! The crate deliberately stops below the connection/pool layer. A caller
//! brings a [`Transport`] (TCP or Unix socket via the `tokio` feature, or
//! anything else that can move bytes) and polls the operation futures.
//!
//! # Examples
//!
//! ```no_run
//! use postwire::{Protocol, StartupConfig, net::Socket};
//!
//! # async fn app() -> postwire::Result<()> {
//! let socket = Socket::connect_tcp("localhost", 5432).await?;
//! let mut conn = Protocol::new(socket);
//!
//! conn.startup(StartupConfig::new("postgres").with_database("postgres"))?.await?;
//!
//! let stmt = conn.prepare("", "SELECT $1::int4 + $2::int4")?.await?;
//! let res = conn.bind_execute(&stmt, &[2.into(), 3.into()], "", 0)?.await?;
//!
//! assert_eq!(res.rows[0][0], 5.into());
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Buffers
pub mod io;

// Wire level
pub mod postgres;

// Values & codecs
pub mod value;
pub mod codec;

// Session state
pub mod settings;
pub mod statement;

// Protocol engine
pub mod transport;
pub mod protocol;
pub mod query;

// Transport implementations
pub mod net;

// Optional external type integrations
pub mod types;

mod error;

pub use codec::{Codec, CustomCodec, DataCodecs, DataError, SharedTypeCache};
pub use error::{ConnectionLost, Error, ErrorKind, InterfaceError, Result};
pub use postgres::{Oid, PgFormat, ServerError, TransactionStatus};
pub use protocol::{Notification, Protocol, StartupConfig};
pub use query::{QueryResult, cancel_request};
pub use settings::SessionSettings;
pub use statement::{PreparedStatement, StatementName};
pub use transport::Transport;
pub use value::Value;

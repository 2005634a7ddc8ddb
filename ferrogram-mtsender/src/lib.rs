// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This library serves to abstract the connection to a Telegram data
//! center.
//!
//! The [`Sender`] is the base building block: it owns one transport
//! connection and one session, serializes every use of the connection
//! behind a lock, and matches requests to their responses while dealing
//! with the protocol's recoverable faults (salt rotation, clock skew,
//! flood waits) on its own.
//!
//! A background keep-alive task can be spawned to ping the server and pull
//! server-pushed updates whenever no foreground call needs the connection;
//! foreground calls reclaim it by cancelling the pending receive.

#![deny(unsafe_code)]

mod dispatch;
mod errors;
mod request;
mod sender;
mod transport;

pub use dispatch::{StandardUpdates, Update, UpdateCatalog};
pub use errors::{FrameError, InvocationError, ReadError, RpcError};
pub use request::{Call, Request};
pub use sender::{DEFAULT_RECEIVE_TIMEOUT, Sender, UpdateHandlerId};
pub use transport::{BoxFuture, CancelToken, TcpFull, Transport};

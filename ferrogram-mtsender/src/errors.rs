// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use ferrogram_mtproto::errors::DeserializeError;
use ferrogram_tl as tl;
use std::{fmt, io};

/// The error type reported by the full transport framing when a packet is
/// structurally wrong. Once this occurs the connection should not continue.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameError {
    /// The length is either too short or too long to represent a valid
    /// packet.
    BadLen { got: i32 },

    /// The sequence number received does not match the expected value.
    BadSeq { expected: i32, got: i32 },

    /// The checksum of the packet does not match its expected value.
    BadCrc { expected: u32, got: u32 },
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame error: ")?;
        match self {
            FrameError::BadLen { got } => write!(f, "bad len (got {got})"),
            FrameError::BadSeq { expected, got } => {
                write!(f, "bad seq (expected {expected}, got {got})")
            }
            FrameError::BadCrc { expected, got } => {
                write!(f, "bad crc (expected {expected}, got {got})")
            }
        }
    }
}

/// This error occurs when reading from the network fails.
#[derive(Debug)]
pub enum ReadError {
    /// Standard I/O error.
    Io(io::Error),

    /// No data arrived within the time the caller was willing to wait.
    Timeout,

    /// The pending read was cancelled from another task. This is the normal
    /// way for a foreground sender to reclaim the transport from the
    /// keep-alive loop, and is consumed silently there; a foreground caller
    /// receiving it indicates a bug.
    Cancelled,

    /// The packet framing was structurally wrong.
    Frame(FrameError),

    /// The envelope could not be decoded into a valid message.
    Deserialize(DeserializeError),
}

impl std::error::Error for ReadError {}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "read error, IO failed: {err}"),
            Self::Timeout => write!(f, "read error, timed out"),
            Self::Cancelled => write!(f, "read error, cancelled"),
            Self::Frame(err) => write!(f, "read error, transport-level: {err}"),
            Self::Deserialize(err) => write!(f, "read error, bad response: {err}"),
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<FrameError> for ReadError {
    fn from(error: FrameError) -> Self {
        Self::Frame(error)
    }
}

impl From<DeserializeError> for ReadError {
    fn from(error: DeserializeError) -> Self {
        Self::Deserialize(error)
    }
}

/// The error type reported by the server when a request is misused.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// A numerical value similar to HTTP status codes.
    pub code: i32,

    /// The ASCII error name, normally in screaming snake case.
    ///
    /// Digit words are removed from the name and put in [`RpcError::value`]
    /// instead.
    pub name: String,

    /// If the error contained an additional integer value, it will be
    /// present here and removed from [`RpcError::name`].
    pub value: Option<u32>,
}

impl std::error::Error for RpcError {}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.name)?;
        if let Some(value) = self.value {
            write!(f, " (value: {value})")?;
        }
        Ok(())
    }
}

impl From<tl::types::RpcError> for RpcError {
    fn from(error: tl::types::RpcError) -> Self {
        // Extract the numeric value in the error, if any
        if let Some((value, parsed_value)) = error
            .error_message
            .split(|c: char| !c.is_ascii_digit())
            .flat_map(|value| {
                value
                    .parse::<u32>()
                    .map(|parsed_value| (value, parsed_value))
            })
            .next()
        {
            let mut to_remove = String::with_capacity(1 + value.len());
            to_remove.push('_');
            to_remove.push_str(value);
            Self {
                code: error.error_code,
                name: error.error_message.replace(&to_remove, ""),
                value: Some(parsed_value),
            }
        } else {
            Self {
                code: error.error_code,
                name: error.error_message.clone(),
                value: None,
            }
        }
    }
}

impl RpcError {
    /// Whether the request that caused this error has to be retransmitted.
    /// The confirmation latch of the request is cleared before the error
    /// surfaces so a later send can re-drive it.
    pub fn must_resend(&self) -> bool {
        // 303 SEE_OTHER: the request must be repeated, on another data
        // center for the *_MIGRATE_* family.
        self.code == 303
    }
}

/// This error occurs when a Remote Procedure Call was unsuccessful.
#[derive(Debug)]
pub enum InvocationError {
    /// The request invocation failed because it was invalid or the server
    /// could not process it successfully.
    Rpc(RpcError),

    /// The server demands a pause of this many seconds before the request
    /// may be repeated. The keep-alive loop also observes this value and
    /// sleeps it off before its next receive.
    FloodWait { seconds: u32 },

    /// The request must be performed on a different data center; the higher
    /// layer is responsible for the migration.
    InvalidDc(RpcError),

    /// The message sent to the server was invalid in a way that cannot be
    /// recovered locally (codes 16 and 17 are corrected in place and never
    /// surface here).
    BadMessage { code: i32 },

    /// A server message that can only be handled with a live foreground
    /// request arrived while none was in flight (e.g. from the keep-alive
    /// loop's receive).
    NoRequest,

    /// The request was completed without its response ever being parsed, so
    /// there is no result to hand out.
    Dropped,

    /// Reading the response from the network failed.
    Read(ReadError),
}

impl std::error::Error for InvocationError {}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(err) => write!(f, "request error: {err}"),
            Self::FloodWait { seconds } => {
                write!(f, "request error: flood wait of {seconds} second(s)")
            }
            Self::InvalidDc(err) => write!(f, "request error: wrong data center ({err})"),
            Self::BadMessage { code } => write!(f, "request error: bad message (code {code})"),
            Self::NoRequest => write!(
                f,
                "request error: server response requires a request, but none is in flight"
            ),
            Self::Dropped => write!(f, "request error: dropped (no response parsed)"),
            Self::Read(err) => write!(f, "request error: {err}"),
        }
    }
}

impl From<ReadError> for InvocationError {
    fn from(error: ReadError) -> Self {
        Self::Read(error)
    }
}

impl From<DeserializeError> for InvocationError {
    fn from(error: DeserializeError) -> Self {
        Self::Read(ReadError::Deserialize(error))
    }
}

impl From<tl::deserialize::Error> for InvocationError {
    fn from(error: tl::deserialize::Error) -> Self {
        InvocationError::from(DeserializeError::from(error))
    }
}

impl From<io::Error> for InvocationError {
    fn from(error: io::Error) -> Self {
        Self::Read(ReadError::Io(error))
    }
}

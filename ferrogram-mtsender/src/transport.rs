// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The byte-level duplex connection consumed by the sender, and the
//! TCP implementation of it using the [full transport] framing.
//!
//! [full transport]: https://core.telegram.org/mtproto/mtproto-transports#full
use crate::errors::{FrameError, ReadError};
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time;

pub use futures_util::future::BoxFuture;

/// The maximum data that we're willing to send or receive at once.
///
/// Telegram will close the connection with roughly a megabyte of data,
/// so to account for the framing's own overhead, we add a few extra
/// kilobytes to the maximum data size.
const MAXIMUM_DATA: usize = (1024 * 1024) + (8 * 1024);

/// Cancels a transport's pending receive from another task.
///
/// Cancelling stores a one-shot permit, so a receive that begins right
/// after the call still observes the cancellation instead of blocking.
#[derive(Clone)]
pub struct CancelToken {
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    /// Makes the receive guarded by [`CancelToken::cancellable`] fail with
    /// [`ReadError::Cancelled`] without consuming any bytes.
    pub fn cancel(&self) {
        self.notify.notify_one();
    }

    /// Runs `op` until completion or until [`CancelToken::cancel`] is
    /// called, whichever happens first.
    pub async fn cancellable<T>(
        &self,
        op: impl Future<Output = Result<T, ReadError>>,
    ) -> Result<T, ReadError> {
        tokio::select! {
            _ = self.notify.notified() => Err(ReadError::Cancelled),
            result = op => result,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A byte-level duplex connection to a data center.
///
/// Exactly one task may use `send`/`receive` at a time (the sender
/// guarantees this with its lock); the cancel token obtained from
/// [`Transport::cancel_token`] is the only part that may be used
/// concurrently from other tasks.
pub trait Transport: Send {
    /// Opens (or reopens) the underlying connection.
    fn connect(&mut self) -> BoxFuture<'_, io::Result<()>>;

    /// Drops the underlying connection, if any.
    fn close(&mut self);

    /// Sends one packet of data, packing it in the transport's framing.
    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Receives a single packet, yielding its transport-level sequence
    /// number and its payload.
    ///
    /// Fails with [`ReadError::Timeout`] if no packet arrived in time and
    /// with [`ReadError::Cancelled`] if the token cancelled the read.
    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Result<(i32, Vec<u8>), ReadError>>;

    /// The token that cancels this transport's pending receive.
    fn cancel_token(&self) -> CancelToken;
}

/// TCP connection using the [full transport] framing:
///
/// ```text
/// +----+----+----...----+----+
/// | len| seq|  payload  | crc|
/// +----+----+----...----+----+
///  ^^^^ 4 bytes
/// ```
///
/// Both ends number the packets they send, starting from zero, and the
/// receiving end validates the counter along with the checksum.
///
/// [full transport]: https://core.telegram.org/mtproto/mtproto-transports#full
pub struct TcpFull {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    send_seq: i32,
    recv_seq: i32,
    cancel: CancelToken,
}

impl TcpFull {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: None,
            send_seq: 0,
            recv_seq: 0,
            cancel: CancelToken::new(),
        }
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "transport not connected")
    }

    async fn receive_packet(&mut self) -> Result<(i32, Vec<u8>), ReadError> {
        let expected_seq = self.recv_seq;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ReadError::Io(Self::not_connected()))?;

        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = i32::from_le_bytes(len_bytes);
        if len < 12 || len as usize > MAXIMUM_DATA {
            return Err(FrameError::BadLen { got: len }.into());
        }
        let len = len as usize;

        // seq + payload + crc
        let mut rest = BytesMut::zeroed(len - 4);
        stream.read_exact(&mut rest).await?;

        let seq = i32::from_le_bytes(rest[0..4].try_into().unwrap());
        if seq != expected_seq {
            return Err(FrameError::BadSeq {
                expected: expected_seq,
                got: seq,
            }
            .into());
        }

        let crc = u32::from_le_bytes(rest[rest.len() - 4..].try_into().unwrap());
        let valid_crc = {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&len_bytes);
            hasher.update(&rest[..rest.len() - 4]);
            hasher.finalize()
        };
        if crc != valid_crc {
            return Err(FrameError::BadCrc {
                expected: valid_crc,
                got: crc,
            }
            .into());
        }

        self.recv_seq += 1;
        Ok((seq, rest[4..rest.len() - 4].to_vec()))
    }
}

impl Transport for TcpFull {
    fn connect(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            log::info!("connecting to {}...", self.addr);
            let stream = TcpStream::connect(self.addr).await?;
            self.stream = Some(stream);
            self.send_seq = 0;
            self.recv_seq = 0;
            Ok(())
        })
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            // payload len + length itself (4 bytes) + send counter (4 bytes) + crc32 (4 bytes)
            let len = (data.len() as i32) + 4 + 4 + 4;
            let mut buffer = BytesMut::with_capacity(len as usize);
            buffer.extend_from_slice(&len.to_le_bytes());
            buffer.extend_from_slice(&self.send_seq.to_le_bytes());
            buffer.extend_from_slice(data);
            let crc = {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&buffer);
                hasher.finalize()
            };
            buffer.extend_from_slice(&crc.to_le_bytes());

            let stream = self.stream.as_mut().ok_or_else(Self::not_connected)?;
            stream.write_all(&buffer).await?;
            stream.flush().await?;
            self.send_seq += 1;
            Ok(())
        })
    }

    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Result<(i32, Vec<u8>), ReadError>> {
        let cancel = self.cancel.clone();
        Box::pin(async move {
            cancel
                .cancellable(async {
                    match time::timeout(timeout, self.receive_packet()).await {
                        Ok(result) => result,
                        Err(_) => Err(ReadError::Timeout),
                    }
                })
                .await
        })
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use ferrogram_mtproto::MsgId;
use ferrogram_tl::{Cursor, Deserializable, RemoteCall, Serializable, deserialize};

/// One in-flight remote procedure call, as the sender sees it.
///
/// The sender borrows a request for the duration of `send` plus `receive`:
/// `send` records the minted message identifier on it, and `receive` keeps
/// reading from the transport until the confirmation latch is set, feeding
/// the server's reply through [`Request::on_response`] along the way.
///
/// The identifier survives retransmissions at the MTProto layer on purpose:
/// a late `rpc_result` still routes to the request that caused it.
pub trait Request: Send {
    /// The serialized body to put on the wire.
    fn body(&self) -> Vec<u8>;

    /// Whether the message counts for sequence numbering. Everything a user
    /// sends does; only internally-generated acknowledgements do not.
    fn content_related(&self) -> bool {
        true
    }

    /// The message identifier assigned on the last send, if any.
    fn msg_id(&self) -> Option<MsgId>;

    /// Records the message identifier minted while sending this request.
    fn assign_msg_id(&mut self, msg_id: MsgId);

    /// Whether a matching reply (rpc_result, pong or logout ack) arrived.
    fn confirm_received(&self) -> bool;

    fn set_confirm_received(&mut self, received: bool);

    /// Parses the server's result into the request's output slot.
    fn on_response(&mut self, reader: &mut Cursor) -> deserialize::Result<()>;
}

/// The carrier pairing a typed [`RemoteCall`] with the mutable state the
/// sender needs: the serialized body, the assigned message identifier, the
/// confirmation latch, and the slot the response is parsed into.
pub struct Call<R: RemoteCall> {
    body: Vec<u8>,
    msg_id: Option<MsgId>,
    confirm_received: bool,
    result: Option<R::Return>,
}

impl<R: RemoteCall> Call<R> {
    pub fn new(request: &R) -> Self {
        Self {
            body: request.to_bytes(),
            msg_id: None,
            confirm_received: false,
            result: None,
        }
    }

    /// The parsed response, if one arrived.
    pub fn result(&self) -> Option<&R::Return> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<R::Return> {
        self.result
    }
}

impl<R: RemoteCall> Request for Call<R>
where
    R::Return: Send,
{
    fn body(&self) -> Vec<u8> {
        self.body.clone()
    }

    fn msg_id(&self) -> Option<MsgId> {
        self.msg_id
    }

    fn assign_msg_id(&mut self, msg_id: MsgId) {
        self.msg_id = Some(msg_id);
    }

    fn confirm_received(&self) -> bool {
        self.confirm_received
    }

    fn set_confirm_received(&mut self, received: bool) {
        self.confirm_received = received;
    }

    fn on_response(&mut self, reader: &mut Cursor) -> deserialize::Result<()> {
        self.result = Some(R::Return::deserialize(reader)?);
        Ok(())
    }
}

// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Routing of decrypted inbound messages.
//!
//! Every message starts with a 32-bit constructor identifier. A handful of
//! [service messages] are parsed manually here; whatever the dispatcher does
//! not recognize is either a server-pushed update (when the externally
//! supplied catalog knows the identifier) or noise to be dropped.
//!
//! [service messages]: https://core.telegram.org/mtproto/service_messages
use crate::errors::{InvocationError, RpcError};
use crate::request::Request;
use ferrogram_mtproto::errors::DeserializeError;
use ferrogram_mtproto::manual_tl::GzipPacked;
use ferrogram_mtproto::{MsgId, Session};
use ferrogram_tl::{Cursor, Deserializable, Identifiable, types};
use log::{debug, info, warn};

/// ```tl
/// rpc_result#f35c6d01 req_msg_id:long result:Object = RpcResult;
/// ```
const RPC_RESULT_ID: u32 = 0xf35c6d01;

/// ```tl
/// msg_container#73f1f8dc messages:vector<message> = MessageContainer;
/// ```
const MSG_CONTAINER_ID: u32 = 0x73f1f8dc;

/// A server-pushed object not tied to any outstanding request, carried as
/// its raw serialization. The higher layer owns the catalog that can turn
/// it back into a concrete object.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub constructor_id: u32,
    pub body: Vec<u8>,
}

/// Decides whether a 32-bit constructor identifier names a known object
/// that should be surfaced as an [`Update`]. Supplied by the layer that
/// owns the full type-language schema.
pub trait UpdateCatalog: Send + Sync {
    fn contains(&self, constructor_id: u32) -> bool;
}

static UPDATE_IDS: [u32; 7] = [
    0xe317af7e, // updatesTooLong
    0x313bc7f8, // updateShortMessage
    0x4d6deea5, // updateShortChatMessage
    0x78d4dec1, // updateShort
    0x725b04c3, // updatesCombined
    0x74ae4240, // updates
    0x9015e101, // updateShortSentMessage
];

/// A catalog of the standard `Updates` constructors, enough to surface the
/// common server pushes without carrying the full schema.
pub struct StandardUpdates;

impl UpdateCatalog for StandardUpdates {
    fn contains(&self, constructor_id: u32) -> bool {
        UPDATE_IDS.contains(&constructor_id)
    }
}

/// One run of the inbound dispatch state machine, borrowing everything it
/// may need to mutate for the duration of a single decrypted payload.
///
/// The `Ok(bool)` result follows the container-skip contract: `false` means
/// the handler may not have consumed its entire entry and the enclosing
/// container must reposition past it; `true` means the message was handled
/// in a way that also requires the in-flight request to be retransmitted
/// (recorded in `resend` and performed by the receive loop, which keeps the
/// send path free of reentrancy).
pub(crate) struct Dispatcher<'a> {
    pub session: &'a mut Session,
    pub acks: &'a mut Vec<i64>,
    pub request: Option<&'a mut dyn Request>,
    pub updates: Option<&'a mut Vec<Update>>,
    pub catalog: &'a dyn UpdateCatalog,
    pub logging_out: bool,
    pub resend: bool,
}

impl Dispatcher<'_> {
    pub fn dispatch(
        &mut self,
        msg_id: i64,
        sequence: i32,
        reader: &mut Cursor,
    ) -> Result<bool, InvocationError> {
        // Everything the server sends gets acknowledged, container entries
        // included.
        self.acks.push(msg_id);

        let start = reader.pos();
        let code = u32::deserialize(reader)?;
        reader.set_pos(start);

        match code {
            RPC_RESULT_ID => self.handle_rpc_result(reader),
            types::Pong::CONSTRUCTOR_ID => self.handle_pong(reader),
            MSG_CONTAINER_ID => self.handle_container(reader),
            GzipPacked::CONSTRUCTOR_ID => self.handle_gzip_packed(msg_id, sequence, reader),
            types::BadServerSalt::CONSTRUCTOR_ID => self.handle_bad_server_salt(reader),
            types::BadMsgNotification::CONSTRUCTOR_ID => {
                self.handle_bad_msg_notification(msg_id, reader)
            }
            types::MsgsAck::CONSTRUCTOR_ID => self.handle_ack(reader),
            _ if self.catalog.contains(code) => self.handle_update(code, reader),
            _ => {
                info!("unknown message: {code:08x}");
                Ok(false)
            }
        }
    }

    /// **Response to an RPC query.**
    ///
    /// The `req_msg_id` names the query this result answers. Matching it
    /// against the in-flight request both completes that request and serves
    /// as the server's acknowledgment of it.
    ///
    /// An inner `rpc_error` is classified before surfacing: flood waits
    /// carry their mandated pause, `*_MIGRATE_*` errors escalate to a data
    /// center switch, and must-resend errors clear the confirmation latch
    /// so the request can be driven again.
    fn handle_rpc_result(&mut self, reader: &mut Cursor) -> Result<bool, InvocationError> {
        debug!("handling rpc result");
        u32::deserialize(reader)?; // constructor
        let req_msg_id = i64::deserialize(reader)?;
        let inner_pos = reader.pos();
        let inner_code = u32::deserialize(reader)?;

        if let Some(request) = self.request.as_deref_mut() {
            if request.msg_id() == Some(MsgId(req_msg_id)) {
                request.set_confirm_received(true);
            }
        }

        if inner_code == types::RpcError::CONSTRUCTOR_ID {
            reader.set_pos(inner_pos);
            let error = types::RpcError::deserialize(reader)?;
            warn!(
                "read rpc error: {} {}",
                error.error_code, error.error_message
            );

            let message = error.error_message.clone();
            let rpc_error = RpcError::from(error);

            if rpc_error.must_resend() {
                match self.request.as_deref_mut() {
                    Some(request) => request.set_confirm_received(false),
                    // The request that must be re-sent was never ours to
                    // re-send (we were only reading updates).
                    None => return Err(InvocationError::NoRequest),
                }
            }

            return if message.starts_with("FLOOD_WAIT_") {
                Err(InvocationError::FloodWait {
                    seconds: rpc_error.value.unwrap_or(0),
                })
            } else if message.contains("_MIGRATE_") {
                Err(InvocationError::InvalidDc(rpc_error))
            } else {
                Err(InvocationError::Rpc(rpc_error))
            };
        }

        let Some(request) = self.request.as_deref_mut() else {
            return Err(InvocationError::NoRequest);
        };

        if inner_code == GzipPacked::CONSTRUCTOR_ID {
            reader.set_pos(inner_pos);
            let packed = GzipPacked::deserialize(reader)?;
            let inflated = packed.decompress()?;
            request.on_response(&mut Cursor::from_slice(&inflated))?;
        } else {
            reader.set_pos(inner_pos);
            if request.msg_id() == Some(MsgId(req_msg_id)) {
                request.on_response(reader)?;
            } else {
                // The container skip takes care of the framing after this.
                warn!("rpc result found for unknown request (maybe from a previous session)");
            }
        }

        Ok(false)
    }

    /// **Ping / Pong.**
    ///
    /// A `pong` echoes the message identifier of the `ping` that caused it,
    /// which is what confirms the ping request.
    fn handle_pong(&mut self, reader: &mut Cursor) -> Result<bool, InvocationError> {
        debug!("handling pong");
        let pong = types::Pong::deserialize(reader)?;

        if let Some(request) = self.request.as_deref_mut() {
            if request.msg_id() == Some(MsgId(pong.msg_id)) {
                request.set_confirm_received(true);
            }
        }

        Ok(false)
    }

    /// **Containers.**
    ///
    /// A container carries several messages inside one envelope; each entry
    /// is dispatched on its own with its own identifier and sequence
    /// number.
    ///
    /// The reader is always advanced to the recorded end of an entry. This
    /// matters: an `rpc_result` for a request from a previous connection
    /// session cannot be matched and is only partially consumed, and
    /// jumping over it by length is what keeps the rest of the container
    /// decodable.
    fn handle_container(&mut self, reader: &mut Cursor) -> Result<bool, InvocationError> {
        debug!("handling container");
        u32::deserialize(reader)?; // constructor
        let count = i32::deserialize(reader)?;

        for _ in 0..count {
            let inner_msg_id = i64::deserialize(reader)?;
            let inner_sequence = i32::deserialize(reader)?;
            let inner_len = i32::deserialize(reader)?;
            if inner_len < 0 {
                return Err(DeserializeError::NegativeMessageLength { got: inner_len }.into());
            }

            let begin = reader.pos();
            let end = begin + inner_len as usize;
            if end > reader.as_bytes().len() {
                return Err(DeserializeError::TooLongMessageLength {
                    got: inner_len as usize,
                    max_length: reader.as_bytes().len() - begin,
                }
                .into());
            }

            let mut inner_reader = Cursor::from_slice(&reader.as_bytes()[begin..end]);
            self.dispatch(inner_msg_id, inner_sequence, &mut inner_reader)?;
            reader.set_pos(end);
        }

        Ok(false)
    }

    /// **Packed object.**
    ///
    /// The inflated bytes are dispatched again under the same identifier
    /// and sequence number, as if the wrapper had not been there.
    fn handle_gzip_packed(
        &mut self,
        msg_id: i64,
        sequence: i32,
        reader: &mut Cursor,
    ) -> Result<bool, InvocationError> {
        debug!("handling gzip packed data");
        let packed = GzipPacked::deserialize(reader)?;
        let inflated = packed.decompress()?;
        self.dispatch(msg_id, sequence, &mut Cursor::from_slice(&inflated))
    }

    /// **Notice of ignored error message: wrong salt.**
    ///
    /// The notification carries the salt the server expects. It is stored
    /// on the session, and the in-flight request is marked for
    /// retransmission; the receive loop re-sends it (fresh identifier, new
    /// salt) and keeps waiting for the real reply.
    fn handle_bad_server_salt(&mut self, reader: &mut Cursor) -> Result<bool, InvocationError> {
        debug!("handling bad server salt");
        let notification = types::BadServerSalt::deserialize(reader)?;

        self.session.set_salt(notification.new_server_salt);

        if self.request.is_none() {
            // Nothing to re-send; the salt is updated but the condition
            // cannot be recovered from here.
            return Err(InvocationError::NoRequest);
        }

        self.resend = true;
        Ok(true)
    }

    /// **Notice of ignored error message.**
    ///
    /// Codes 16 and 17 mean our message identifiers are out of sync with
    /// the server's clock; the offset is corrected from the identifier of
    /// the notification itself and the session persisted. Anything else is
    /// unrecoverable at this layer.
    fn handle_bad_msg_notification(
        &mut self,
        msg_id: i64,
        reader: &mut Cursor,
    ) -> Result<bool, InvocationError> {
        debug!("handling bad message notification");
        let notification = types::BadMsgNotification::deserialize(reader)?;

        match notification.error_code {
            16 | 17 => {
                // Sent msg_id was too low or too high: use the id the
                // server just minted to determine the right time offset.
                self.session.update_time_offset(msg_id);
                self.session.save()?;
                warn!(
                    "bad message (code {}), corrected the time offset",
                    notification.error_code
                );
                Ok(false)
            }
            code => Err(InvocationError::BadMessage { code }),
        }
    }

    /// **Acknowledgment of receipt.**
    ///
    /// Acks normally carry no routing information for us. The one exception
    /// is logging out: `auth.logOut` is confirmed by an ack rather than an
    /// `rpc_result`, so while the logout flag is set an ack that lists the
    /// in-flight request's identifier completes it.
    fn handle_ack(&mut self, reader: &mut Cursor) -> Result<bool, InvocationError> {
        let ack = types::MsgsAck::deserialize(reader)?;

        if let Some(request) = self.request.as_deref_mut() {
            if let Some(MsgId(msg_id)) = request.msg_id() {
                if ack.msg_ids.contains(&msg_id) {
                    warn!("ack found for the current request");
                    if self.logging_out {
                        info!("message ack confirmed the logout request");
                        request.set_confirm_received(true);
                    }
                }
            }
        }

        Ok(false)
    }

    /// Anything the catalog recognizes is a server-pushed update; it is
    /// surfaced raw if a sink was provided and dropped otherwise.
    fn handle_update(&mut self, code: u32, reader: &mut Cursor) -> Result<bool, InvocationError> {
        let mut body = Vec::with_capacity(reader.remaining());
        reader.read_to_end(&mut body)?;

        match self.updates.as_deref_mut() {
            Some(sink) => {
                debug!("read update {code:08x}");
                sink.push(Update {
                    constructor_id: code,
                    body,
                });
            }
            None => debug!("ignored update {code:08x}"),
        }

        Ok(false)
    }
}

// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The frame codec: packing one serialized message into an encrypted
//! MTProto envelope, and unpacking an inbound envelope back into the
//! plaintext message it carries.
//!
//! The plaintext prefix is always
//! `salt(8) || session_id(8) || msg_id(8) || seq_no(4) || len(4)`, followed
//! by `len` bytes of body and the random padding required by MTProto 2.0.
use crate::errors::DeserializeError;
use crate::session::Session;
use crate::MsgId;
use ferrogram_crypto::{decrypt_data, encrypt_data, Side};
use ferrogram_tl::{Cursor, Deserializable, Serializable};

// salt + session_id + msg_id + seq_no + len
const PLAINTEXT_PREFIX_LEN: usize = 8 + 8 + 8 + 4 + 4;

/// One message unpacked from an inbound envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedMessage {
    pub body: Vec<u8>,
    pub msg_id: i64,
    pub sequence: i32,
}

/// Packs one serialized message body into an encrypted envelope, minting a
/// fresh message identifier and sequence number from the session.
///
/// The minted identifier is returned so the caller can record it on the
/// request for response routing. Must be called while holding whatever lock
/// serializes sends, since it advances the session's counters.
pub fn encrypt_message(
    session: &mut Session,
    body: &[u8],
    content_related: bool,
) -> (Vec<u8>, MsgId) {
    let msg_id = session.next_msg_id();
    let seq_no = session.next_seq_no(content_related);

    let mut plaintext = Vec::with_capacity(PLAINTEXT_PREFIX_LEN + body.len());
    session.salt().serialize(&mut plaintext);
    session.id().serialize(&mut plaintext);
    msg_id.serialize(&mut plaintext);
    seq_no.serialize(&mut plaintext);
    (body.len() as i32).serialize(&mut plaintext);
    plaintext.extend_from_slice(body);

    let envelope = encrypt_data(&plaintext, session.auth_key(), Side::Client);
    (envelope, MsgId(msg_id))
}

/// Unpacks an inbound encrypted envelope into the message it carries.
///
/// Fails if the envelope is too short to be valid, if it was produced under
/// a different authorization key, if its message key does not match the
/// plaintext, or if the inner length field is impossible.
pub fn decrypt_message(
    session: &Session,
    envelope: &[u8],
) -> Result<DecryptedMessage, DeserializeError> {
    let plaintext = decrypt_data(envelope, session.auth_key(), Side::Server)?;
    if plaintext.len() < PLAINTEXT_PREFIX_LEN {
        return Err(DeserializeError::MessageBufferTooSmall);
    }

    let mut reader = Cursor::from_slice(&plaintext);
    let _salt = i64::deserialize(&mut reader)?;
    let _session_id = i64::deserialize(&mut reader)?;
    let msg_id = i64::deserialize(&mut reader)?;
    let sequence = i32::deserialize(&mut reader)?;

    let len = i32::deserialize(&mut reader)?;
    if len < 0 {
        return Err(DeserializeError::NegativeMessageLength { got: len });
    }
    let len = len as usize;
    if len > reader.remaining() {
        return Err(DeserializeError::TooLongMessageLength {
            got: len,
            max_length: reader.remaining(),
        });
    }

    let mut body = vec![0; len];
    reader.read_exact(&mut body)?;

    Ok(DecryptedMessage {
        body,
        msg_id,
        sequence,
    })
}

// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Hand-written definitions for the service types the sender needs to
//! understand on its own. All of them are (de)serialized in their boxed
//! form, that is, with the leading constructor identifier.
use crate::Identifiable;
use crate::deserialize::{self, Buffer, Deserializable};
use crate::serialize::Serializable;

fn expect_constructor<T: Identifiable>(buf: Buffer) -> deserialize::Result<()> {
    let id = u32::deserialize(buf)?;
    if id != T::CONSTRUCTOR_ID {
        Err(deserialize::Error::UnexpectedConstructor { id })
    } else {
        Ok(())
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// pong#347773c5 msg_id:long ping_id:long = Pong;
/// ```
///
/// The `msg_id` field echoes the message identifier of the `ping` that
/// caused this response.
#[derive(Clone, Debug, PartialEq)]
pub struct Pong {
    pub msg_id: i64,
    pub ping_id: i64,
}

impl Identifiable for Pong {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0x347773c5;
}

impl Serializable for Pong {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_id.serialize(buf);
        self.ping_id.serialize(buf);
    }
}

impl Deserializable for Pong {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            msg_id: i64::deserialize(buf)?,
            ping_id: i64::deserialize(buf)?,
        })
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// msgs_ack#62d6b459 msg_ids:Vector<long> = MsgsAck;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MsgsAck {
    pub msg_ids: Vec<i64>,
}

impl Identifiable for MsgsAck {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0x62d6b459;
}

impl Serializable for MsgsAck {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_ids.serialize(buf);
    }
}

impl Deserializable for MsgsAck {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            msg_ids: Vec::<i64>::deserialize(buf)?,
        })
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// rpc_error#2144ca19 error_code:int error_message:string = RpcError;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    pub error_code: i32,
    pub error_message: String,
}

impl Identifiable for RpcError {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0x2144ca19;
}

impl Serializable for RpcError {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.error_code.serialize(buf);
        self.error_message.serialize(buf);
    }
}

impl Deserializable for RpcError {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            error_code: i32::deserialize(buf)?,
            error_message: String::deserialize(buf)?,
        })
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// bad_server_salt#edab447b bad_msg_id:long bad_msg_seqno:int
///     error_code:int new_server_salt:long = BadMsgNotification;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BadServerSalt {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
    pub new_server_salt: i64,
}

impl Identifiable for BadServerSalt {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0xedab447b;
}

impl Serializable for BadServerSalt {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.bad_msg_id.serialize(buf);
        self.bad_msg_seqno.serialize(buf);
        self.error_code.serialize(buf);
        self.new_server_salt.serialize(buf);
    }
}

impl Deserializable for BadServerSalt {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            bad_msg_id: i64::deserialize(buf)?,
            bad_msg_seqno: i32::deserialize(buf)?,
            error_code: i32::deserialize(buf)?,
            new_server_salt: i64::deserialize(buf)?,
        })
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// bad_msg_notification#a7eff811 bad_msg_id:long bad_msg_seqno:int
///     error_code:int = BadMsgNotification;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BadMsgNotification {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
}

impl Identifiable for BadMsgNotification {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0xa7eff811;
}

impl Serializable for BadMsgNotification {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.bad_msg_id.serialize(buf);
        self.bad_msg_seqno.serialize(buf);
        self.error_code.serialize(buf);
    }
}

impl Deserializable for BadMsgNotification {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            bad_msg_id: i64::deserialize(buf)?,
            bad_msg_seqno: i32::deserialize(buf)?,
            error_code: i32::deserialize(buf)?,
        })
    }
}

/// This struct represents the following TL definition:
///
/// ```tl
/// updates.state#a56c2a3e pts:int qts:int date:int seq:int
///     unread_count:int = updates.State;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub pts: i32,
    pub qts: i32,
    pub date: i32,
    pub seq: i32,
    pub unread_count: i32,
}

impl Identifiable for State {
    #[allow(clippy::unreadable_literal)]
    const CONSTRUCTOR_ID: u32 = 0xa56c2a3e;
}

impl Serializable for State {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.pts.serialize(buf);
        self.qts.serialize(buf);
        self.date.serialize(buf);
        self.seq.serialize(buf);
        self.unread_count.serialize(buf);
    }
}

impl Deserializable for State {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_constructor::<Self>(buf)?;
        Ok(Self {
            pts: i32::deserialize(buf)?,
            qts: i32::deserialize(buf)?,
            date: i32::deserialize(buf)?,
            seq: i32::deserialize(buf)?,
            unread_count: i32::deserialize(buf)?,
        })
    }
}

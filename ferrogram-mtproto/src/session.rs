// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The mutable state of one MTProto session: the authorization key, the
//! server-provided salt, the session identifier, and the counters used to
//! mint message identifiers and sequence numbers.
use ferrogram_crypto::AuthKey;
use ferrogram_tl::{Cursor, Deserializable, Serializable};
use getrandom::getrandom;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The state of one session with a data center.
///
/// The session outlives individual connections: the same authorization key,
/// identifier and counters are reused after a reconnection. All mutation
/// happens under the owning coordinator's lock.
pub struct Session {
    /// The authorization key used to encrypt and decrypt payload.
    auth_key: AuthKey,

    /// The current salt to be mixed into every outgoing envelope.
    salt: i64,

    /// The secure, random identifier for this session.
    id: i64,

    /// How many content-related messages have been sent so far.
    sequence: i32,

    /// The time offset from the server's time, in seconds.
    time_offset: i32,

    /// The ID of the last message.
    last_msg_id: i64,

    /// Where to persist this session on `save`, if anywhere.
    file: Option<PathBuf>,
}

impl Session {
    /// Creates a fresh session for the given authorization key, with a
    /// random session identifier and zeroed counters.
    pub fn new(auth_key: [u8; 256]) -> Self {
        Self {
            auth_key: AuthKey::from_bytes(auth_key),
            salt: 0,
            id: {
                let mut buffer = [0u8; 8];
                getrandom(&mut buffer).expect("failed to generate a secure session id");
                i64::from_le_bytes(buffer)
            },
            sequence: 0,
            time_offset: 0,
            last_msg_id: 0,
            file: None,
        }
    }

    /// Loads a previously [`Session::save`]d session from the given file.
    /// The loaded session will persist back to the same file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        fn malformed<E>(_: E) -> io::Error {
            io::Error::new(io::ErrorKind::InvalidData, "malformed session file")
        }

        let bytes = fs::read(path.as_ref())?;
        let mut cursor = Cursor::from_slice(&bytes);

        let mut auth_key = [0u8; 256];
        cursor.read_exact(&mut auth_key).map_err(malformed)?;
        let salt = i64::deserialize(&mut cursor).map_err(malformed)?;
        let id = i64::deserialize(&mut cursor).map_err(malformed)?;
        let sequence = i32::deserialize(&mut cursor).map_err(malformed)?;
        let time_offset = i32::deserialize(&mut cursor).map_err(malformed)?;

        Ok(Self {
            auth_key: AuthKey::from_bytes(auth_key),
            salt,
            id,
            sequence,
            time_offset,
            last_msg_id: 0,
            file: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Makes `save` persist this session to the given file from now on.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Persists the session to its backing file. A session without a
    /// backing file saves to nowhere and reports success.
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = self.file.as_deref() else {
            return Ok(());
        };

        let mut buffer = Vec::with_capacity(256 + 8 + 8 + 4 + 4);
        buffer.extend_from_slice(&self.auth_key.to_bytes());
        self.salt.serialize(&mut buffer);
        self.id.serialize(&mut buffer);
        self.sequence.serialize(&mut buffer);
        self.time_offset.serialize(&mut buffer);
        fs::write(path, buffer)
    }

    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    pub fn salt(&self) -> i64 {
        self.salt
    }

    pub fn set_salt(&mut self, salt: i64) {
        self.salt = salt;
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    /// Generates a new unique message ID based on the current time since
    /// epoch, applying the known time offset.
    ///
    /// Identifiers are strictly increasing: a fresh identifier that would
    /// not be greater than the last one is bumped past it instead.
    pub fn next_msg_id(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is before epoch");

        let seconds = (now.as_secs() as i64 + self.time_offset as i64) as u64;
        let nanoseconds = now.subsec_nanos() as u64;
        let mut new_msg_id = ((seconds << 32) | (nanoseconds << 2)) as i64;

        if self.last_msg_id >= new_msg_id {
            new_msg_id = self.last_msg_id + 4;
        }

        self.last_msg_id = new_msg_id;
        new_msg_id
    }

    /// Generates the next sequence number depending on whether it is for a
    /// content-related message or not.
    ///
    /// Content-related messages occupy one sequence slot each and get the
    /// odd value `2n + 1`; everything else carries the even value `2n`
    /// without consuming a slot.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let result = self.sequence * 2 + 1;
            self.sequence += 1;
            result
        } else {
            self.sequence * 2
        }
    }

    /// Corrects the time offset based on a message ID known to be valid,
    /// so that subsequently minted identifiers track the server's clock.
    pub fn update_time_offset(&mut self, correct_msg_id: i64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is before epoch")
            .as_secs() as i64;

        let correct = correct_msg_id >> 32;
        self.time_offset = (correct - now) as i32;
    }
}

// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end tests for the sender, driving it through an in-memory
//! transport with envelopes forged the way the server would produce them.
use ferrogram_crypto::{AuthKey, Side, decrypt_data, encrypt_data};
use ferrogram_mtproto::Session;
use ferrogram_mtproto::manual_tl::GzipPacked;
use ferrogram_mtsender::{
    BoxFuture, Call, CancelToken, InvocationError, ReadError, Request, Sender, StandardUpdates,
    Transport, Update,
};
use ferrogram_tl::{Deserializable, Serializable, functions, types};
use simple_logger::SimpleLogger;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);
const UPDATES_TOO_LONG: u32 = 0xe317af7e;

/// A duplex transport over in-memory channels: the test feeds envelopes in
/// through one end and observes everything the sender transmits through
/// the other.
struct MemTransport {
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    cancel: CancelToken,
}

impl Transport for MemTransport {
    fn connect(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) {}

    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        let _ = self.outbox.send(data.to_vec());
        Box::pin(async { Ok(()) })
    }

    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Result<(i32, Vec<u8>), ReadError>> {
        let cancel = self.cancel.clone();
        Box::pin(async move {
            cancel
                .cancellable(async {
                    match tokio::time::timeout(timeout, self.inbox.recv()).await {
                        Ok(Some(bytes)) => Ok((0, bytes)),
                        Ok(None) => Err(ReadError::Io(io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "inbox closed",
                        ))),
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

fn test_auth_key_bytes() -> [u8; 256] {
    let mut buffer = [0u8; 256];
    buffer
        .iter_mut()
        .enumerate()
        .for_each(|(i, x)| *x = i as u8);
    buffer
}

fn rt() -> runtime::Runtime {
    runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

type Inbox = mpsc::UnboundedSender<Vec<u8>>;
type Outbox = mpsc::UnboundedReceiver<Vec<u8>>;

fn setup() -> (Arc<Sender>, Inbox, Outbox, AuthKey) {
    let _ = SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let transport = MemTransport {
        inbox: inbox_rx,
        outbox: outbox_tx,
        cancel: CancelToken::new(),
    };

    let sender = Sender::new(
        transport,
        Session::new(test_auth_key_bytes()),
        StandardUpdates,
    );
    (
        sender,
        inbox_tx,
        outbox_rx,
        AuthKey::from_bytes(test_auth_key_bytes()),
    )
}

/// Forges an inbound envelope the way the server would produce it.
fn forge(key: &AuthKey, msg_id: i64, sequence: i32, body: &[u8]) -> Vec<u8> {
    let mut plaintext = Vec::new();
    0i64.serialize(&mut plaintext); // salt (not validated by the client)
    0i64.serialize(&mut plaintext); // session id (not validated either)
    msg_id.serialize(&mut plaintext);
    sequence.serialize(&mut plaintext);
    (body.len() as i32).serialize(&mut plaintext);
    plaintext.extend_from_slice(body);
    encrypt_data(&plaintext, key, Side::Server)
}

#[derive(Debug)]
struct ClientMessage {
    salt: i64,
    msg_id: i64,
    seq: i32,
    body: Vec<u8>,
}

/// Opens an envelope the sender transmitted.
fn open_client(key: &AuthKey, envelope: &[u8]) -> ClientMessage {
    let plaintext = decrypt_data(envelope, key, Side::Client).unwrap();
    let len = i32::from_le_bytes(plaintext[28..32].try_into().unwrap()) as usize;
    ClientMessage {
        salt: i64::from_le_bytes(plaintext[0..8].try_into().unwrap()),
        msg_id: i64::from_le_bytes(plaintext[16..24].try_into().unwrap()),
        seq: i32::from_le_bytes(plaintext[24..28].try_into().unwrap()),
        body: plaintext[32..32 + len].to_vec(),
    }
}

fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    0xf35c6d01u32.serialize(&mut buf);
    req_msg_id.serialize(&mut buf);
    buf.extend_from_slice(result);
    buf
}

fn container(entries: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    0x73f1f8dcu32.serialize(&mut buf);
    (entries.len() as i32).serialize(&mut buf);
    for (msg_id, sequence, body) in entries {
        msg_id.serialize(&mut buf);
        sequence.serialize(&mut buf);
        (body.len() as i32).serialize(&mut buf);
        buf.extend_from_slice(body);
    }
    buf
}

fn state() -> types::State {
    types::State {
        pts: 100,
        qts: 200,
        date: 300,
        seq: 4,
        unread_count: 0,
    }
}

#[test]
fn simple_rpc_call_completes_and_acks() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();

        let first = open_client(&key, &outbox.recv().await.unwrap());
        // first content-related message of the session
        assert_eq!(first.seq, 1);
        assert_eq!(
            first.body,
            functions::GetState {}.to_bytes(),
            "request body reaches the wire untouched"
        );

        inbox
            .send(forge(
                &key,
                1000,
                1,
                &rpc_result(first.msg_id, &state().to_bytes()),
            ))
            .unwrap();
        sender.receive(&mut call, TIMEOUT).await.unwrap();
        assert!(call.confirm_received());
        assert_eq!(call.result(), Some(&state()));

        // The server's message must be acknowledged as a prefix of the
        // next transmission, draining the buffer.
        let mut second = Call::new(&functions::GetState {});
        sender.send(&mut second).await.unwrap();

        let ack = open_client(&key, &outbox.recv().await.unwrap());
        let ack_body = types::MsgsAck::from_bytes(&ack.body).unwrap();
        assert_eq!(ack_body.msg_ids, vec![1000]);
        // acks do not consume a sequence slot
        assert_eq!(ack.seq, 2);

        let request = open_client(&key, &outbox.recv().await.unwrap());
        assert_eq!(request.seq, 3);
        assert!(request.msg_id > first.msg_id);

        // Nothing pending: a further send transmits no ack packet.
        let mut third = Call::new(&functions::GetState {});
        sender.send(&mut third).await.unwrap();
        let request = open_client(&key, &outbox.recv().await.unwrap());
        assert!(types::MsgsAck::from_bytes(&request.body).is_err());
        assert_eq!(request.seq, 5);
    });
}

#[test]
fn container_completes_request_and_surfaces_update() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());

        let entries = [
            (1001, 1, rpc_result(sent.msg_id, &state().to_bytes())),
            (1002, 3, UPDATES_TOO_LONG.to_bytes()),
        ];
        inbox
            .send(forge(&key, 1000, 1, &container(&entries)))
            .unwrap();

        let mut updates = Vec::new();
        sender
            .receive_with_updates(&mut call, TIMEOUT, &mut updates)
            .await
            .unwrap();

        assert_eq!(call.result(), Some(&state()));
        assert_eq!(
            updates,
            vec![Update {
                constructor_id: UPDATES_TOO_LONG,
                body: UPDATES_TOO_LONG.to_bytes(),
            }]
        );

        // Container and both inner messages are acknowledged.
        let mut next = Call::new(&functions::GetState {});
        sender.send(&mut next).await.unwrap();
        let ack = open_client(&key, &outbox.recv().await.unwrap());
        let ack_body = types::MsgsAck::from_bytes(&ack.body).unwrap();
        assert_eq!(ack_body.msg_ids, vec![1000, 1001, 1002]);
    });
}

#[test]
fn gzipped_rpc_result_completes_request() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());

        let packed = GzipPacked::new(&state().to_bytes()).to_bytes();
        inbox
            .send(forge(&key, 1000, 1, &rpc_result(sent.msg_id, &packed)))
            .unwrap();

        sender.receive(&mut call, TIMEOUT).await.unwrap();
        assert_eq!(call.result(), Some(&state()));
    });
}

#[test]
fn bad_server_salt_retransmits_under_the_new_salt() {
    const NEW_SALT: i64 = 0x7eadbeef_00c0ffee;

    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let driver = tokio::spawn({
            let inbox = inbox.clone();
            let key = key.clone();
            async move {
                let first = open_client(&key, &outbox.recv().await.unwrap());

                let notification = types::BadServerSalt {
                    bad_msg_id: first.msg_id,
                    bad_msg_seqno: first.seq,
                    error_code: 48,
                    new_server_salt: NEW_SALT,
                }
                .to_bytes();
                inbox.send(forge(&key, 1000, 1, &notification)).unwrap();

                // The retransmission acknowledges the notification first.
                let ack = open_client(&key, &outbox.recv().await.unwrap());
                let resent = open_client(&key, &outbox.recv().await.unwrap());
                inbox
                    .send(forge(
                        &key,
                        1001,
                        3,
                        &rpc_result(resent.msg_id, &state().to_bytes()),
                    ))
                    .unwrap();

                (first, ack, resent)
            }
        });

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        sender.receive(&mut call, TIMEOUT).await.unwrap();

        let (first, ack, resent) = driver.await.unwrap();
        assert_eq!(call.result(), Some(&state()));
        assert!(call.confirm_received());

        assert_eq!(
            types::MsgsAck::from_bytes(&ack.body).unwrap().msg_ids,
            vec![1000]
        );

        // Fresh identifier, new salt; the response was parsed exactly once.
        assert!(resent.msg_id > first.msg_id);
        assert_ne!(first.salt, NEW_SALT);
        assert_eq!(resent.salt, NEW_SALT);
        assert_eq!(resent.body, first.body);
    });
}

#[test]
fn flood_wait_surfaces_and_schedules_the_sleep() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());

        let error = types::RpcError {
            error_code: 420,
            error_message: "FLOOD_WAIT_7".into(),
        }
        .to_bytes();
        inbox
            .send(forge(&key, 1000, 1, &rpc_result(sent.msg_id, &error)))
            .unwrap();

        let err = sender.receive(&mut call, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, InvocationError::FloodWait { seconds: 7 }));
        assert_eq!(sender.pending_flood_sleep(), Some(7));
    });
}

#[test]
fn bad_msg_notification_recovers_the_time_offset() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());

        // The server's clock is five minutes ahead of ours.
        let server_time = (sent.msg_id >> 32) + 300;
        let server_msg_id = server_time << 32;

        let notification = types::BadMsgNotification {
            bad_msg_id: sent.msg_id,
            bad_msg_seqno: sent.seq,
            error_code: 16,
        }
        .to_bytes();
        inbox
            .send(forge(&key, server_msg_id, 1, &notification))
            .unwrap();
        inbox
            .send(forge(
                &key,
                server_msg_id + 4,
                3,
                &rpc_result(sent.msg_id, &state().to_bytes()),
            ))
            .unwrap();

        // No error surfaces; the offset is corrected in place.
        sender.receive(&mut call, TIMEOUT).await.unwrap();
        assert_eq!(call.result(), Some(&state()));

        // Identifiers now track the server's clock.
        let mut next = Call::new(&functions::GetState {});
        sender.send(&mut next).await.unwrap();
        let _ack = outbox.recv().await.unwrap();
        let request = open_client(&key, &outbox.recv().await.unwrap());
        assert!(request.msg_id >> 32 >= server_time - 1);
    });
}

#[test]
fn logout_is_confirmed_by_an_ack() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();
        sender.set_logging_out(true);

        let mut call = Call::new(&functions::LogOut {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());

        let ack = types::MsgsAck {
            msg_ids: vec![sent.msg_id],
        }
        .to_bytes();
        inbox.send(forge(&key, 1000, 2, &ack)).unwrap();

        sender.receive(&mut call, TIMEOUT).await.unwrap();
        assert!(call.confirm_received());
    });
}

#[test]
fn receive_surfaces_timeouts() {
    rt().block_on(async {
        let (sender, _inbox, _outbox, _key) = setup();

        let mut updates = Vec::new();
        let err = sender
            .receive_updates(Duration::from_millis(50), &mut updates)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Read(ReadError::Timeout)
        ));
    });
}

#[test]
fn foreground_send_reclaims_the_transport_from_the_keepalive_loop() {
    rt().block_on(async {
        let (sender, inbox, mut outbox, key) = setup();

        let received = Arc::new(Mutex::new(Vec::new()));
        sender.add_update_handler({
            let received = Arc::clone(&received);
            move |update: &Update| received.lock().unwrap().push(update.clone())
        });
        Arc::clone(&sender).spawn_keepalive();

        // Give the loop time to start its (long) receive.
        tokio::time::sleep(Duration::from_millis(300)).await;

        // A foreground call must cancel that receive and go through.
        let mut call = Call::new(&functions::GetState {});
        sender.send(&mut call).await.unwrap();
        let sent = open_client(&key, &outbox.recv().await.unwrap());
        inbox
            .send(forge(
                &key,
                1000,
                1,
                &rpc_result(sent.msg_id, &state().to_bytes()),
            ))
            .unwrap();
        sender.receive(&mut call, TIMEOUT).await.unwrap();
        assert_eq!(call.result(), Some(&state()));

        // The loop survives the cancellation and resumes receiving.
        inbox
            .send(forge(&key, 1001, 3, &UPDATES_TOO_LONG.to_bytes()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(
            received
                .lock()
                .unwrap()
                .iter()
                .any(|update| update.constructor_id == UPDATES_TOO_LONG)
        );

        sender.disconnect().await;
    });
}

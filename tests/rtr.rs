//! An RTR server conversation over a real socket.

use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use lodestar::payload::{
    RouteOrigin, SharedHistory, ValidationReport,
};
use lodestar::rtr::server::{NotifySender, Server, Timing};
use lodestar::slurm::LocalExceptions;
use lodestar::tal::TalInfo;

const IPV4_PREFIX_LEN: usize = 20;
const HEADER_LEN: usize = 8;
const END_OF_DATA_V1_LEN: usize = 24;

fn origin(addr: [u8; 4], len: u8, asn: u32) -> RouteOrigin {
    RouteOrigin::new(IpAddr::from(addr), len, len, asn.into())
}

fn snapshot(
    origins: &[RouteOrigin]
) -> lodestar::payload::PayloadSnapshot {
    let tal = TalInfo::from_name("test".into()).into_arc();
    let mut report = ValidationReport::new();
    for &item in origins {
        report.add_origin(item, tal.clone());
    }
    report.into_snapshot(&LocalExceptions::default())
}

async fn start_server(
    history: SharedHistory, notify: NotifySender
) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(
        TcpListenerStream::new(listener),
        notify,
        history,
        Duration::from_secs(5),
    );
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn read_exact(sock: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    sock.read_exact(&mut buf).await.unwrap();
    buf
}

/// Reads a header, returning (version, type, session, length).
async fn read_header(sock: &mut TcpStream) -> (u8, u8, u16, u32) {
    let buf = read_exact(sock, HEADER_LEN).await;
    (
        buf[0],
        buf[1],
        u16::from_be_bytes([buf[2], buf[3]]),
        u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
    )
}

async fn send_reset_query(sock: &mut TcpStream, version: u8) {
    let pdu = [version, 2, 0, 0, 0, 0, 0, 8];
    sock.write_all(&pdu).await.unwrap();
}

async fn send_serial_query(
    sock: &mut TcpStream, version: u8, session: u16, serial: u32
) {
    let mut pdu = vec![version, 1];
    pdu.extend_from_slice(&session.to_be_bytes());
    pdu.extend_from_slice(&12u32.to_be_bytes());
    pdu.extend_from_slice(&serial.to_be_bytes());
    sock.write_all(&pdu).await.unwrap();
}

#[tokio::test]
async fn reset_and_serial_exchange() {
    let history = SharedHistory::new(2, Timing::default());
    let a = origin([192, 0, 2, 0], 24, 64500);
    let b = origin([198, 51, 100, 0], 24, 64501);
    history.update(snapshot(&[a, b]));            // serial 1

    let notify = NotifySender::new();
    let addr = start_server(history.clone(), notify).await;
    let mut sock = TcpStream::connect(addr).await.unwrap();

    // A reset query gets the full set: Cache Response, two IPv4
    // prefix PDUs, End of Data.
    send_reset_query(&mut sock, 1).await;
    let (version, pdu_type, session, length)
        = read_header(&mut sock).await;
    assert_eq!(version, 1);
    assert_eq!(pdu_type, 3);
    assert_eq!(length, 8);

    let mut prefixes = Vec::new();
    for _ in 0..2 {
        let (_, pdu_type, _, length) = read_header(&mut sock).await;
        assert_eq!(pdu_type, 4);
        assert_eq!(length, IPV4_PREFIX_LEN as u32);
        let body = read_exact(
            &mut sock, IPV4_PREFIX_LEN - HEADER_LEN
        ).await;
        // flags announce, prefix-len, max-len, zero.
        assert_eq!(body[0], 1);
        prefixes.push((
            [body[4], body[5], body[6], body[7]],
            body[1],
            u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
        ));
    }
    assert!(prefixes.contains(&([192, 0, 2, 0], 24, 64500)));
    assert!(prefixes.contains(&([198, 51, 100, 0], 24, 64501)));

    let (_, pdu_type, eod_session, length)
        = read_header(&mut sock).await;
    assert_eq!(pdu_type, 7);
    assert_eq!(eod_session, session);
    assert_eq!(length, END_OF_DATA_V1_LEN as u32);
    let body = read_exact(
        &mut sock, END_OF_DATA_V1_LEN - HEADER_LEN
    ).await;
    let serial = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    assert_eq!(serial, 1);
    // Timing values follow the serial in version 1.
    let refresh = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    assert_eq!(refresh, Timing::default().refresh);

    // A serial query at the current serial: empty incremental update.
    send_serial_query(&mut sock, 1, session, serial).await;
    let (_, pdu_type, _, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 3);
    let (_, pdu_type, _, length) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 7);
    let _ = read_exact(&mut sock, length as usize - HEADER_LEN).await;

    // Push two more serials. With a history of two snapshots only one
    // delta is retained, so serial 1 is out of reach: Cache Reset.
    history.update(snapshot(&[a]));                // serial 2
    history.update(snapshot(&[]));                 // serial 3
    send_serial_query(&mut sock, 1, session, 1).await;
    let (_, pdu_type, _, length) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 8);
    assert_eq!(length, 8);

    // Serial 2 is still reachable and withdraws the one prefix left.
    send_serial_query(&mut sock, 1, session, 2).await;
    let (_, pdu_type, _, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 3);
    let (_, pdu_type, _, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 4);
    let body = read_exact(&mut sock, IPV4_PREFIX_LEN - HEADER_LEN).await;
    // flags: withdraw.
    assert_eq!(body[0], 0);
    assert_eq!([body[4], body[5], body[6], body[7]], [192, 0, 2, 0]);
    let (_, pdu_type, _, length) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 7);
    let body = read_exact(&mut sock, length as usize - HEADER_LEN).await;
    assert_eq!(
        u32::from_be_bytes([body[0], body[1], body[2], body[3]]), 3
    );
}

#[tokio::test]
async fn serial_notify_on_update() {
    let history = SharedHistory::new(4, Timing::default());
    history.update(snapshot(&[]));                 // serial 1

    let notify = NotifySender::new();
    let addr = start_server(history.clone(), notify.clone()).await;
    let mut sock = TcpStream::connect(addr).await.unwrap();

    // Handshake so the connection knows its version.
    send_reset_query(&mut sock, 0).await;
    let (version, pdu_type, _, _) = read_header(&mut sock).await;
    assert_eq!(version, 0);
    assert_eq!(pdu_type, 3);
    let (_, pdu_type, _, length) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 7);
    // Version 0 End of Data only has the serial.
    assert_eq!(length, 12);
    let _ = read_exact(&mut sock, 4).await;

    // A commit with changes triggers a Serial Notify.
    history.update(
        snapshot(&[origin([203, 0, 113, 0], 24, 64502)])
    );
    notify.notify();
    let (version, pdu_type, _, length) = read_header(&mut sock).await;
    assert_eq!(version, 0);
    assert_eq!(pdu_type, 0);
    assert_eq!(length, 12);
    let body = read_exact(&mut sock, 4).await;
    assert_eq!(
        u32::from_be_bytes([body[0], body[1], body[2], body[3]]), 2
    );
}

#[tokio::test]
async fn unsupported_version_gets_error_report() {
    let history = SharedHistory::new(2, Timing::default());
    history.update(snapshot(&[]));

    let notify = NotifySender::new();
    let addr = start_server(history, notify).await;
    let mut sock = TcpStream::connect(addr).await.unwrap();

    send_reset_query(&mut sock, 2).await;
    let (_, pdu_type, error_code, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 10);
    // Error code 4: unsupported protocol version.
    assert_eq!(error_code, 4);

    // The server closes the connection after the error report.
    let mut buf = Vec::new();
    let res = tokio::time::timeout(
        Duration::from_secs(5),
        sock.read_to_end(&mut buf),
    ).await;
    assert!(res.is_ok());
}

#[tokio::test]
async fn version_switch_rejected() {
    let history = SharedHistory::new(2, Timing::default());
    history.update(snapshot(&[]));

    let notify = NotifySender::new();
    let addr = start_server(history, notify).await;
    let mut sock = TcpStream::connect(addr).await.unwrap();

    // Negotiate version 1 ...
    send_reset_query(&mut sock, 1).await;
    let (_, pdu_type, _, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 3);
    let (_, _, _, length) = read_header(&mut sock).await;
    let _ = read_exact(&mut sock, length as usize - HEADER_LEN).await;

    // ... then switch to version 0 mid-session.
    send_reset_query(&mut sock, 0).await;
    let (_, pdu_type, error_code, _) = read_header(&mut sock).await;
    assert_eq!(pdu_type, 10);
    assert_eq!(error_code, 4);
}

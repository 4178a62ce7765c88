use hostkit::error::{ErrorKind, RemoteError};
use hostkit::transfer::{ACK, TransferDescriptor, receive_file, send_file};
use sha2::{Digest, Sha256};

const PIPE: usize = 1 << 20;

async fn round_trip(mode: u32, name: &str, content: &[u8]) -> (Vec<u8>, Vec<u8>, String) {
    let descriptor = TransferDescriptor::new(mode, content.len() as u64, name);
    let (mut wire_tx, mut wire_rx) = tokio::io::duplex(PIPE);
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let (sent, got) = tokio::join!(
        send_file(content, &mut wire_tx, &descriptor),
        receive_file(&mut wire_rx, &mut acks, &mut received),
    );
    let sent = sent.expect("send");
    let got = got.expect("receive");

    assert_eq!(sent.sha256, got.sha256);
    assert_eq!(got.descriptor.mode, mode);
    assert_eq!(got.descriptor.name, name);
    assert_eq!(got.bytes, content.len() as u64);
    (received, acks, got.sha256)
}

#[tokio::test]
async fn text_file_survives_source_to_sink() {
    let content = b"line one\nline two\n";
    let (received, acks, sha256) = round_trip(0o600, "notes.txt", content).await;

    assert_eq!(received, content);
    assert_eq!(acks, vec![ACK, ACK, ACK]);
    assert_eq!(sha256, format!("{:x}", Sha256::digest(content)));
}

#[tokio::test]
async fn empty_file_survives_source_to_sink() {
    let (received, acks, _) = round_trip(0o644, "empty", b"").await;
    assert!(received.is_empty());
    assert_eq!(acks.len(), 3);
}

#[tokio::test]
async fn binary_payload_with_nul_bytes_is_not_cut_short() {
    let content: Vec<u8> = (0..70_000u32).map(|i| (i % 7) as u8).collect();
    let (received, _, _) = round_trip(0o660, "blob.bin", &content).await;
    assert_eq!(received, content);
}

#[tokio::test]
async fn source_writes_header_payload_and_end_marker() {
    let descriptor = TransferDescriptor::new(0o600, 5, "a.txt");
    let mut wire = Vec::new();

    send_file(&b"hello"[..], &mut wire, &descriptor)
        .await
        .expect("send");

    assert_eq!(wire, b"C0600 5 a.txt\nhello\x00");
    assert!(descriptor.progress().is_complete());
}

#[tokio::test]
async fn source_rejects_short_local_reader() {
    let descriptor = TransferDescriptor::new(0o600, 10, "short");
    let mut wire = Vec::new();

    let err = send_file(&b"four"[..], &mut wire, &descriptor)
        .await
        .expect_err("reader is shorter than declared");

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert!(!wire.ends_with(&[ACK]));
}

#[tokio::test]
async fn source_never_reads_beyond_declared_length() {
    let descriptor = TransferDescriptor::new(0o600, 3, "abc");
    let mut wire = Vec::new();

    send_file(&b"abcdef"[..], &mut wire, &descriptor)
        .await
        .expect("send");

    assert_eq!(wire, b"C0600 3 abc\nabc\x00");
}

#[tokio::test]
async fn truncated_stream_fails_without_final_ack() {
    let mut wire = b"C0644 100 partial.log\n".to_vec();
    wire.extend(std::iter::repeat_n(b'x', 50));
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let err = receive_file(&wire[..], &mut acks, &mut received)
        .await
        .expect_err("only half the payload arrives");

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(acks, vec![ACK, ACK]);
    assert_eq!(received.len(), 50);
}

#[tokio::test]
async fn sender_warning_becomes_protocol_error() {
    let wire: &[u8] = b"\x01disk full\n";
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let err = receive_file(wire, &mut acks, &mut received)
        .await
        .expect_err("sender reported a problem");

    assert!(matches!(err, RemoteError::Protocol(ref m) if m.contains("disk full")));
    assert_eq!(acks, vec![ACK]);
    assert!(received.is_empty());
}

#[tokio::test]
async fn fatal_error_from_sender_is_reported() {
    let wire: &[u8] = b"\x02scp: /etc/shadow: Permission denied\n";
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let err = receive_file(wire, &mut acks, &mut received)
        .await
        .expect_err("fatal");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("Permission denied"));
}

#[tokio::test]
async fn sink_ignores_bytes_after_the_payload() {
    let wire: &[u8] = b"C0644 2 ok\nokTRAILING";
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let report = receive_file(wire, &mut acks, &mut received)
        .await
        .expect("receive");

    assert_eq!(received, b"ok");
    assert_eq!(report.bytes, 2);
}

#[tokio::test]
async fn empty_stream_is_a_protocol_error() {
    let mut acks = Vec::new();
    let mut received = Vec::new();

    let err = receive_file(&b""[..], &mut acks, &mut received)
        .await
        .expect_err("nothing was sent");

    assert_eq!(err.kind(), ErrorKind::Protocol);
}

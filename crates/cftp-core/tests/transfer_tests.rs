//! End-to-end transfers between a sender and a receiver session.

mod common;

use std::path::Path;
use std::time::Duration;

use cftp_core::config::{ClientMode, Config};
use cftp_core::connection::{self, Channel};
use cftp_core::file::{FileRecord, HashStatus};
use cftp_core::protocol::ErrorCode;
use cftp_core::server::Server;
use cftp_core::session::{
    QuotaPolicy, ReceiverSession, ReceiverState, SenderSession, SenderState, TransferReport,
};
use cftp_core::ErrorKind;

use common::{
    assert_files_equal, channel_pair, create_temp_dir, create_test_file, random_bytes,
    CorruptingStream, IO_TIMEOUT,
};

const CHUNK: u32 = 1024;

/// Send `source` to a receiver writing into `dest_dir`, both over a duplex pipe.
async fn transfer_in_memory(
    source: &Path,
    dest_dir: &Path,
    policy: QuotaPolicy,
) -> (TransferReport, TransferReport, Vec<ReceiverState>) {
    let (sender_channel, receiver_channel) = channel_pair();
    let dest_dir = dest_dir.to_path_buf();

    let receiver = tokio::spawn(async move {
        let mut session = ReceiverSession::new(receiver_channel, dest_dir, policy);
        let report = session.run().await;
        (report, session.visited().to_vec())
    });

    let record = FileRecord::from_path(source, CHUNK).await.unwrap();
    let mut sender = SenderSession::new(sender_channel, record);
    let sent = sender.run().await;
    drop(sender);

    let (received, visited) = receiver.await.unwrap();
    (sent, received, visited)
}

async fn round_trip(size: usize) {
    let dir = create_temp_dir();
    let content = random_bytes(size);
    let source = create_test_file(dir.path(), "payload.bin", &content);
    let dest_dir = dir.path().join("received");

    let (sent, received, visited) =
        transfer_in_memory(&source, &dest_dir, QuotaPolicy::default()).await;

    assert!(sent.success, "sender failed: {:?}", sent.error);
    assert!(received.success, "receiver failed: {:?}", received.error);
    assert_eq!(visited.last(), Some(&ReceiverState::Done(cftp_core::session::Outcome::Success)));

    let expected_chunks = size.div_ceil(CHUNK as usize) as u32;
    assert_eq!(sent.num_chunks, expected_chunks);
    assert_eq!(received.num_chunks, expected_chunks);
    assert_eq!(received.file_size, size as u64);
    assert_eq!(sent.retries, 0);
    assert_eq!(sent.resyncs, 0);

    let destination = received.destination.expect("receiver reports destination");
    assert_eq!(destination, dest_dir.join("payload.bin"));
    assert_files_equal(&source, &destination);
}

#[tokio::test]
async fn test_transfer_empty_file() {
    round_trip(0).await;
}

#[tokio::test]
async fn test_transfer_just_under_one_chunk() {
    round_trip(CHUNK as usize - 1).await;
}

#[tokio::test]
async fn test_transfer_exactly_one_chunk() {
    round_trip(CHUNK as usize).await;
}

#[tokio::test]
async fn test_transfer_many_chunks_with_short_tail() {
    round_trip(10 * CHUNK as usize + 7).await;
}

#[tokio::test]
async fn test_transfer_over_loopback_tcp() {
    let dir = create_temp_dir();
    let content = random_bytes(5 * CHUNK as usize + 300);
    let source = create_test_file(dir.path(), "tcp.bin", &content);

    let mut config = Config::default();
    config.network.host = "127.0.0.1".to_string();
    config.network.port = 0;
    config.server.transfer_dir = dir.path().join("inbox");
    config.server.client_mode = ClientMode::Single;
    let server = Server::bind(&config).unwrap();
    let addr = server.local_addr().unwrap();

    let serve = tokio::spawn(async move { server.serve_one().await.unwrap() });

    let stream = connection::connect(addr, Duration::from_secs(5)).await.unwrap();
    let record = FileRecord::from_path(&source, CHUNK).await.unwrap();
    let mut sender = SenderSession::new(Channel::new(stream, Some(IO_TIMEOUT)), record);
    let sent = sender.run().await;

    let (peer, received) = serve.await.unwrap();
    assert!(peer.ip().is_loopback());
    assert!(sent.success, "sender failed: {:?}", sent.error);
    assert!(received.success, "receiver failed: {:?}", received.error);
    assert_files_equal(&source, &dir.path().join("inbox").join("tcp.bin"));
}

#[tokio::test]
async fn test_sender_progress_reaches_total() {
    let dir = create_temp_dir();
    let source = create_test_file(dir.path(), "progress.bin", &random_bytes(3 * CHUNK as usize));
    let (sender_channel, receiver_channel) = channel_pair();

    let dest = dir.path().join("out");
    let receiver = tokio::spawn(async move {
        ReceiverSession::new(receiver_channel, dest, QuotaPolicy::default())
            .run()
            .await
    });

    let record = FileRecord::from_path(&source, CHUNK).await.unwrap();
    let mut sender = SenderSession::new(sender_channel, record);
    let progress = sender.progress();
    let report = sender.run().await;

    assert!(report.success);
    assert!(receiver.await.unwrap().success);

    let last = progress.borrow().clone();
    assert_eq!(last.bytes_transferred, 3 * u64::from(CHUNK));
    assert_eq!(last.chunks_done, 3);
    assert!((last.percentage() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_corrupted_chunk_fails_integrity_check() {
    let dir = create_temp_dir();
    let content = random_bytes(4 * CHUNK as usize);
    let source = create_test_file(dir.path(), "corrupt.bin", &content);
    let dest_dir = dir.path().join("received");

    let (a, b) = tokio::io::duplex(256 * 1024);
    // SIF (32) + parameters (548) + SRF (32) + DTF (32): first data byte
    let sender_channel = Channel::new(CorruptingStream::new(a, 644), Some(IO_TIMEOUT));
    let receiver_channel = Channel::new(b, Some(IO_TIMEOUT));

    let receiver_dir = dest_dir.clone();
    let receiver = tokio::spawn(async move {
        let mut session =
            ReceiverSession::new(receiver_channel, receiver_dir, QuotaPolicy::default());
        let report = session.run().await;
        let status = session.record().map(|r| r.hash_status);
        (report, status)
    });

    let record = FileRecord::from_path(&source, CHUNK).await.unwrap();
    let mut sender = SenderSession::new(sender_channel, record);
    let sent = sender.run().await;
    let sender_states = sender.visited().to_vec();
    drop(sender);

    let (received, status) = receiver.await.unwrap();
    assert!(!received.success);
    assert_eq!(
        received.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::IntegrityMismatch)
    );
    assert_eq!(status, Some(HashStatus::Announced));

    // No FAF: the sender never completes.
    assert!(!sent.success);
    assert!(sender_states.contains(&SenderState::RecvFileFinishAck));
    assert!(!sender_states.contains(&SenderState::Done(cftp_core::session::Outcome::Success)));

    // The partial file stays on disk.
    let kept = std::fs::read(dest_dir.join("corrupt.bin")).unwrap();
    assert_eq!(kept.len(), content.len());
    assert_ne!(kept, content);
}

#[tokio::test]
async fn test_quota_rejection_creates_no_file() {
    let dir = create_temp_dir();
    let source = create_test_file(dir.path(), "big.bin", &random_bytes(2 * CHUNK as usize));
    let dest_dir = dir.path().join("received");

    let policy = QuotaPolicy {
        quota: Some(u64::from(CHUNK)),
        ..QuotaPolicy::default()
    };
    let (sent, received, visited) = transfer_in_memory(&source, &dest_dir, policy).await;

    assert!(!received.success);
    assert_eq!(
        received.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::AdmissionRejected)
    );
    assert!(visited.contains(&ReceiverState::SendSessionClose));
    assert!(!visited.contains(&ReceiverState::RecvClientReady));
    assert!(!dest_dir.join("big.bin").exists());

    assert!(!sent.success);
    assert_eq!(
        sent.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::AdmissionRejected)
    );
}

#[tokio::test]
async fn test_unsafe_filename_is_refused() {
    use cftp_core::protocol::{Frame, ParameterFormat, SessionInitFrame, SessionParameters};
    use cftp_core::protocol::SIMPLE_PARAMETERS_LEN;

    let dir = create_temp_dir();
    let (mut peer, receiver_channel) = channel_pair();
    let dest_dir = dir.path().join("received");

    let receiver_dir = dest_dir.clone();
    let receiver = tokio::spawn(async move {
        ReceiverSession::new(receiver_channel, receiver_dir, QuotaPolicy::default())
            .run()
            .await
    });

    let params = SessionParameters::new("..", 10, CHUNK, [0; 5]).unwrap();
    peer.send_frame(&Frame::SessionInit(SessionInitFrame {
        error_code: ErrorCode::NoError,
        session_token: 7,
        parameter_format: ParameterFormat::Simple as u16,
        parameter_length: SIMPLE_PARAMETERS_LEN as u16,
    }))
    .await
    .unwrap();
    peer.send_payload(&params.encode()).await.unwrap();

    let reply = peer.recv_frame().await.unwrap();
    assert_eq!(reply.error_code(), Some(ErrorCode::UnacceptableParameters));
    assert_eq!(reply.session_token(), Some(7));

    let report = receiver.await.unwrap();
    assert!(!report.success);
    assert!(!dest_dir.exists() || std::fs::read_dir(&dest_dir).unwrap().next().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_receiver_times_out_on_silent_sender() {
    use cftp_core::crypto;
    use cftp_core::protocol::{
        Frame, ParameterFormat, SessionInitFrame, SessionParameters, SIMPLE_PARAMETERS_LEN,
    };

    let dir = create_temp_dir();
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut peer = Channel::new(a, None);
    let receiver_channel = Channel::new(b, Some(Duration::from_secs(3)));

    let content = random_bytes(10);
    let params =
        SessionParameters::new("quiet.bin", 10, CHUNK, crypto::digest_bytes(&content)).unwrap();
    peer.send_frame(&Frame::SessionInit(SessionInitFrame {
        error_code: ErrorCode::NoError,
        session_token: 0x51,
        parameter_format: ParameterFormat::Simple as u16,
        parameter_length: SIMPLE_PARAMETERS_LEN as u16,
    }))
    .await
    .unwrap();
    peer.send_payload(&params.encode()).await.unwrap();

    // The sender never sends SRF.
    let mut receiver =
        ReceiverSession::new(receiver_channel, dir.path().to_path_buf(), QuotaPolicy::default());
    let report = receiver.run().await;

    assert!(!report.success);
    let error = report.error.as_ref().expect("receiver reports an error");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert_eq!(error.close_code, Some(ErrorCode::ServerTimeout));
    assert!(receiver.visited().contains(&ReceiverState::RecvClientReady));
    assert!(!receiver.visited().contains(&ReceiverState::RecvDataBlocks));

    assert!(matches!(peer.recv_frame().await.unwrap(), Frame::SessionAck(_)));
    peer.recv_payload(SIMPLE_PARAMETERS_LEN).await.unwrap();
    let Frame::SessionClose(scf) = peer.recv_frame().await.unwrap() else {
        panic!("expected SCF after the timeout");
    };
    assert_eq!(scf.error_code, ErrorCode::ServerTimeout);
    assert_eq!(scf.session_token, 0x51);
}

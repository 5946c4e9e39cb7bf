use std::io::{Read, Write};
use std::time::Duration;

use eio_transport::http_io::HttpRequest;
use eio_transport::packet::{CodeType, Packet, PacketKind};
use eio_transport::payload::{self, PayloadForm};
use eio_transport::polling::PollingServer;
use eio_transport::PollingConfig;

fn get_request() -> HttpRequest {
    HttpRequest {
        method: "GET".into(),
        path: "/engine.io".into(),
        query: Default::default(),
        headers: Default::default(),
        body: Vec::new(),
    }
}

fn post_request(body: Vec<u8>) -> HttpRequest {
    HttpRequest {
        method: "POST".into(),
        path: "/engine.io".into(),
        query: Default::default(),
        headers: Default::default(),
        body,
    }
}

#[tokio::test]
async fn get_before_write_times_out_then_drains_after_write() {
    let server = PollingServer::new(PollingConfig {
        read_timeout: None,
        write_timeout: Some(Duration::from_millis(80)),
    });

    let resp = server.serve_http(&get_request()).await;
    assert_eq!(resp.status, 408);

    let mut w1 = server.next_writer(CodeType::Binary, PacketKind::Message);
    w1.write_all(b"first").unwrap();
    server.commit_writer(w1).await;

    let mut w2 = server.next_writer(CodeType::Binary, PacketKind::Message);
    w2.write_all(b"second").unwrap();
    server.commit_writer(w2).await;

    let resp = server.serve_http(&get_request()).await;
    assert_eq!(resp.status, 200);

    let mut decoder = payload::PayloadDecoder::new(std::io::Cursor::new(resp.body));
    let p1 = decoder.next().unwrap();
    assert_eq!(p1.data, b"first");
    let p2 = decoder.next().unwrap();
    assert_eq!(p2.data, b"second");
    assert!(matches!(decoder.next(), Err(e) if e.is_eof()));
}

#[tokio::test]
async fn post_delivers_frames_in_order_gated_by_reader_close() {
    let server = std::sync::Arc::new(PollingServer::new(PollingConfig {
        read_timeout: Some(Duration::from_millis(500)),
        write_timeout: None,
    }));

    let packets = vec![
        Packet::new(CodeType::Binary, PacketKind::Message, b"alpha".to_vec()),
        Packet::new(CodeType::Binary, PacketKind::Message, b"beta".to_vec()),
    ];
    let mut body = Vec::new();
    payload::encode(&mut body, PayloadForm::Binary, &packets).unwrap();

    let server_for_post = server.clone();
    let post_handle = tokio::spawn(async move { server_for_post.serve_http(&post_request(body)).await });

    let (code, kind, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(kind, PacketKind::Message);
    assert_eq!(code, CodeType::Binary);
    let mut data = Vec::new();
    reader.read_to_end(&mut data).unwrap();
    assert_eq!(data, b"alpha");

    // Until this reader is closed, the POST handler is still waiting on
    // this frame's rendezvous and hasn't advanced to the next one.
    reader.close();

    let (_, _, mut reader2) = server.next_reader().await.unwrap();
    let mut data2 = Vec::new();
    reader2.read_to_end(&mut data2).unwrap();
    assert_eq!(data2, b"beta");
    reader2.close();

    let resp = post_handle.await.unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn concurrent_gets_yield_exactly_one_interleave_rejection() {
    let server = std::sync::Arc::new(PollingServer::new(PollingConfig {
        read_timeout: None,
        write_timeout: Some(Duration::from_millis(150)),
    }));

    let s1 = server.clone();
    let h1 = tokio::spawn(async move { s1.serve_http(&get_request()).await });
    tokio::time::sleep(Duration::from_millis(15)).await;
    let resp2 = server.serve_http(&get_request()).await;

    let resp1 = h1.await.unwrap();
    let statuses = [resp1.status, resp2.status];
    assert!(statuses.contains(&400));
    assert!(statuses.contains(&408));
    let rejected = if resp1.status == 400 { &resp1 } else { &resp2 };
    assert_eq!(rejected.body, b"interleave GET\n");
}

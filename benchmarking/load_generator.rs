use std::time::{Duration, Instant};

use eio_transport::websocket::{handshake, Role, WebSocketAdapter};
use eio_transport::{CodeType, PacketKind, WebSocketConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

async fn connect(ws_url: &str) -> WebSocketAdapter<TcpStream> {
    let (host, path) = handshake::parse_ws_url(ws_url).unwrap();
    let mut stream = TcpStream::connect(&host).await.unwrap();
    let key = handshake::generate_client_key();
    let request = handshake::build_client_request(&host, &path, &key);
    stream.write_all(request.as_bytes()).await.unwrap();
    let (status, _headers) = handshake::read_handshake_response(&mut stream).await.unwrap();
    assert_eq!(status, 101, "handshake did not switch protocols");
    WebSocketAdapter::new(stream, Role::Client, WebSocketConfig::default())
}

#[tokio::main]
async fn main() {
    let ws_url = "ws://127.0.0.1:9101/ws";
    let connection_count = 100;
    let message_count = 1000;
    let message_size = 16384;

    let (tx, mut rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut ws = connect(ws_url).await;
            let payload = vec![b'a'; message_size];
            let start = Instant::now();

            for _ in 0..message_count {
                let mut writer = ws.next_writer(CodeType::Binary, PacketKind::Message).unwrap();
                std::io::Write::write_all(&mut writer, &payload).unwrap();
                writer.finish().await.unwrap();
                let _ = ws.next_reader().await.unwrap();
            }

            let duration = start.elapsed();
            tx.send(duration).unwrap();
        });
    }

    drop(tx);

    let mut total_duration = Duration::new(0, 0);
    while let Some(duration) = rx.recv().await {
        total_duration += duration;
    }

    let avg_latency = total_duration / (connection_count as u32 * message_count as u32);
    println!("Average Latency: {:?}", avg_latency);
}

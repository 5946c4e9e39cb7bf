use std::sync::Arc;

use eio_transport::polling::PollingServer;
use eio_transport::{PacketKind, PollingConfig};
use log::*;
use std::io::Read;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

async fn handle_conn(server: Arc<PollingServer>, mut stream: TcpStream) {
    let req = match eio_transport::http_io::HttpRequest::read_from(&mut stream).await {
        Ok(req) => req,
        Err(e) => {
            error!("malformed request: {}", e);
            return;
        }
    };

    let resp = server.serve_http(&req).await;
    if let Err(e) = stream.write_all(&resp.to_bytes()).await {
        error!("failed to write response: {}", e);
    }
}

async fn echo_loop(server: Arc<PollingServer>) {
    loop {
        let (code, kind, mut reader) = match server.next_reader().await {
            Ok(r) => r,
            Err(e) => {
                if !e.is_eof() {
                    error!("next_reader failed: {}", e);
                }
                return;
            }
        };
        if kind != PacketKind::Message {
            continue;
        }

        let mut data = Vec::new();
        if let Err(e) = reader.read_to_end(&mut data) {
            error!("failed to read packet body: {}", e);
            continue;
        }
        reader.close();

        let mut writer = server.next_writer(code, PacketKind::Message);
        if std::io::Write::write_all(&mut writer, &data).is_ok() {
            server.commit_writer(writer).await;
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let server = Arc::new(PollingServer::new(PollingConfig {
        read_timeout: Some(std::time::Duration::from_secs(30)),
        write_timeout: Some(std::time::Duration::from_secs(25)),
    }));

    tokio::spawn(echo_loop(server.clone()));

    let addr = "127.0.0.1:9100";
    let listener = TcpListener::bind(addr).await.expect("can't listen");
    info!("polling echo server listening on {}", addr);

    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(handle_conn(server.clone(), stream));
    }
}

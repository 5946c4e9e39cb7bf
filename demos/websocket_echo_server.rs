use std::io::Read;

use eio_transport::http_io::{HttpRequest, HttpResponse};
use eio_transport::websocket::handshake;
use eio_transport::websocket::{Role, WebSocketAdapter};
use eio_transport::{PacketKind, WebSocketConfig};
use log::*;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

async fn handle_conn(mut stream: TcpStream) {
    let req = match HttpRequest::read_from(&mut stream).await {
        Ok(req) => req,
        Err(e) => {
            error!("malformed request: {}", e);
            return;
        }
    };

    let accept = match handshake::server_accept(&req) {
        Ok(accept) => accept,
        Err(e) => {
            let resp = HttpResponse::bad_request(e.to_string());
            let _ = stream.write_all(&resp.to_bytes()).await;
            return;
        }
    };
    let response = handshake::build_server_response(&accept);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("failed to write handshake response: {}", e);
        return;
    }

    let mut adapter = WebSocketAdapter::new(stream, Role::Server, WebSocketConfig::default());
    loop {
        let (code, kind, mut reader) = match adapter.next_reader().await {
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

        let writer = match adapter.next_writer(code, PacketKind::Message) {
            Ok(w) => w,
            Err(e) => {
                error!("next_writer failed: {}", e);
                return;
            }
        };
        let mut writer = writer;
        if std::io::Write::write_all(&mut writer, &data).is_ok() {
            if let Err(e) = writer.finish().await {
                error!("failed to send echo: {}", e);
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:9101";
    let listener = TcpListener::bind(addr).await.expect("can't listen");
    info!("websocket echo server listening on {}", addr);

    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(handle_conn(stream));
    }
}

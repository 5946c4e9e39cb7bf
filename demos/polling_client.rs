use eio_transport::polling::{ClientRequestTemplate, PollingClient};
use eio_transport::{CodeType, PacketKind, PollingConfig};
use log::*;

#[tokio::main]
async fn main() {
    env_logger::init();

    let client = PollingClient::new(
        ClientRequestTemplate {
            host: "127.0.0.1:9100".into(),
            path: "/engine.io".into(),
            use_b64: false,
        },
        PollingConfig {
            read_timeout: Some(std::time::Duration::from_secs(30)),
            write_timeout: Some(std::time::Duration::from_secs(25)),
        },
    );

    let reader_client = client.clone();
    tokio::spawn(async move {
        loop {
            match reader_client.next_reader().await {
                Ok((_, PacketKind::Message, pkt)) => {
                    info!("echoed back: {}", String::from_utf8_lossy(&pkt.data));
                }
                Ok(_) => {}
                Err(e) => {
                    if !e.is_eof() {
                        error!("next_reader failed: {}", e);
                    }
                    return;
                }
            }
        }
    });

    let mut writer = client.next_writer(CodeType::Text, PacketKind::Message);
    std::io::Write::write_all(&mut writer, b"hello from the polling client").unwrap();
    if let Err(e) = client.commit_writer(writer).await {
        error!("commit_writer failed: {}", e);
        return;
    }

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
}

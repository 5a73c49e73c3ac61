use clap::Parser;
use log::{error, info, warn};
use peerchat::calls::UnsupportedMediaStack;
use peerchat::{Client, ClientConfig};
use std::sync::Arc;

// Headless client for the signaling relay. It logs in, keeps presence and
// chat flowing, and declines calls it cannot take (there is no media stack
// on a server). Wire a real MediaDevices/PeerConnector pair through the
// library API to actually place calls.

#[derive(Parser)]
#[command(about = "Headless signaling client")]
struct Args {
    /// Relay websocket endpoint, e.g. wss://chat.example/ws
    #[arg(long, default_value = "ws://127.0.0.1:8765/ws")]
    url: String,

    #[arg(short, long)]
    username: String,

    #[arg(short, long)]
    password: String,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let config = ClientConfig::new(args.url, args.username, args.password);
        let media = Arc::new(UnsupportedMediaStack);
        let client = Client::new(config, media.clone(), media);
        let events = client.events();

        let mut incoming = events.incoming_call.subscribe();
        tokio::spawn(async move {
            while let Ok(call) = incoming.recv().await {
                info!("Incoming {} call from {}", call.call_type, call.from);
            }
        });
        let mut presence = events.presence.subscribe();
        tokio::spawn(async move {
            while let Ok(update) = presence.recv().await {
                info!("Online: {}", update.online_users.join(", "));
            }
        });
        let mut chat = events.chat_message.subscribe();
        tokio::spawn(async move {
            while let Ok(message) = chat.recv().await {
                info!("<{}> {}", message.user, message.msg);
            }
        });

        tokio::select! {
            result = client.run() => {
                if let Err(e) = result {
                    error!("Client stopped: {e}");
                    std::process::exit(1);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
            }
        }
    });
}

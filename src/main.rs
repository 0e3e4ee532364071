mod common;
mod config;
mod dispatch;
mod network;
mod opinion;
mod store;
mod ui;

use std::error::Error;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use network::{NetworkHandle, P2PClient};
use tokio::sync::{mpsc, watch};
use ui::{ChatApp, Display};

use dispatch::Dispatcher;

const DEFAULT_ROOM: &str = "awesome-chat-room";

#[derive(Parser)]
#[command(
    name = "p2p_stock_chat",
    version,
    about = "Peer-to-peer chat rooms for sharing stock opinions"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Nickname shown to other peers (defaults to $USER-<short peer id>)
    #[arg(long)]
    nick: Option<String>,
    /// Room to join
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    /// Listen multiaddr, overrides the config file
    #[arg(long, value_name = "MULTIADDR")]
    listen: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Run without a window: relay gossip, validate and store records
    Server,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if let Some(listen) = cli.listen.clone() {
        app_config.listen_addr = listen;
    }
    let bootstrap_peers = parse_bootstrap_peers(&app_config.bootstrap_nodes);
    let headless = cli.mode == Some(Mode::Server);

    // 1. Tạo các kênh giao tiếp (Channels)
    // Dispatch -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> Dispatch
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    // UI -> Dispatch
    let (input_tx, input_rx) = mpsc::channel(100);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 2. Khởi chạy Network Thread (Chạy ngầm)
    let client = P2PClient::new(&app_config, cli.nick.clone(), bootstrap_peers, event_tx, cmd_rx)
        .inspect_err(|err| log::error!("Failed to start network: {err}"))?;
    let nick = client.nick().to_string();
    let network_task = tokio::spawn(client.run(shutdown_rx.clone()));

    let network = NetworkHandle::new(cmd_tx);
    let room = network
        .join_room(&cli.room)
        .await
        .inspect_err(|err| log::error!("Failed to join room {}: {err}", cli.room))?;
    log::info!("Joined {} as {nick}", room.name);

    // 3. Dispatch loop
    let title = format!("Room: {}", room.name);
    let display = if headless {
        Display::headless(title)
    } else {
        Display::new(title)
    };
    let dispatcher = Dispatcher::new(
        room,
        display.clone(),
        network,
        app_config.share_dir_for(&nick),
        cli.config.clone(),
        shutdown_rx,
    );
    let dispatch_task = tokio::spawn(dispatcher.run(
        input_rx,
        event_rx,
        app_config.peer_refresh_interval(),
    ));

    // 4. Khởi chạy UI (Chạy trên Main Thread)
    let result = if headless {
        wait_for_ctrl_c().await;
        drop(input_tx);
        Ok(())
    } else {
        run_ui(display, input_tx, nick)
    };

    let _ = shutdown_tx.send(true);
    if let Err(err) = dispatch_task.await {
        log::error!("Dispatch task failed: {err}");
    }
    if let Err(err) = network_task.await {
        log::error!("Network task failed: {err}");
    }
    result?;
    Ok(())
}

async fn wait_for_ctrl_c() {
    log::info!("Running headless; press Ctrl-C to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {err}");
        return;
    }
    log::info!("Ctrl-C received, shutting down");
}

fn run_ui(display: Display, input_tx: mpsc::Sender<String>, nick: String) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    let title = display.read(|surface| surface.title.clone());

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(ChatApp::new(cc, display, input_tx, &nick)))),
    )
}

fn parse_bootstrap_peers(entries: &[String]) -> Vec<(PeerId, Multiaddr)> {
    entries
        .iter()
        .filter_map(|entry| {
            let mut addr: Multiaddr = match entry.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    log::warn!("Invalid multiaddr `{entry}`: {err}");
                    return None;
                }
            };

            let peer_id = match addr.pop() {
                Some(Protocol::P2p(peer)) => peer,
                _ => {
                    log::warn!("Multiaddr `{entry}` missing /p2p/PeerId suffix");
                    return None;
                }
            };

            Some((peer_id, addr))
        })
        .collect()
}

pub mod input;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};

use crate::common::{ChatError, NetworkEvent};
use crate::config::persist_bootstrap_node;
use crate::network::{NetworkHandle, PeerDirectory, RoomHandle};
use crate::opinion::{OpinionRecord, Reconciled, ReconciliationEngine};
use crate::ui::{Display, DisplayLine, LineColor};

pub use input::{UserAction, load_share_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn opinion_line(record: &OpinionRecord) -> String {
    format!(
        "STOCK OPINION - {} | STOCK SCORE - {}",
        record.text, record.score
    )
}

fn listing_line(record: &OpinionRecord) -> String {
    format!(
        "{} ({} Stock Rating = {}): {}",
        record.author, record.stock, record.score, record.text
    )
}

/// Vòng lặp xử lý chính.
///
/// Owns the opinion table and the peer directory; user input, network
/// events and the peer refresh tick are all handled here, one at a time.
/// Only the display is shared with other tasks.
pub struct Dispatcher {
    room: RoomHandle,
    engine: ReconciliationEngine,
    peers: PeerDirectory,
    display: Display,
    network: NetworkHandle,
    share_dir: PathBuf,
    config_path: String,
    /// Latest opinion published locally per stock, for `/put`.
    own_opinions: BTreeMap<String, OpinionRecord>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        room: RoomHandle,
        display: Display,
        network: NetworkHandle,
        share_dir: PathBuf,
        config_path: String,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            room,
            engine: ReconciliationEngine::new(),
            peers: PeerDirectory::new(),
            display,
            network,
            share_dir,
            config_path,
            own_opinions: BTreeMap::new(),
            shutdown,
        }
    }

    /// Runs until `/quit`, shutdown, or until either input channel closes.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<String>,
        mut events: mpsc::UnboundedReceiver<NetworkEvent>,
        refresh: Duration,
    ) {
        let mut shutdown = self.shutdown.clone();
        let mut refresh = interval(refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Dispatch loop started for room {}", self.room.name);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                line = input.recv() => {
                    let Some(line) = line else {
                        log::info!("Input closed");
                        break;
                    };
                    if self.handle_input(&line).await == Flow::Quit {
                        self.display.request_close();
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        log::warn!("Network task stopped delivering events");
                        break;
                    };
                    self.handle_network_event(event);
                }
                _ = refresh.tick() => self.refresh_peers(),
            }
        }
        log::info!("Dispatch loop stopped");
    }

    pub async fn handle_input(&mut self, line: &str) -> Flow {
        let Some(action) = UserAction::parse(line) else {
            return Flow::Continue;
        };
        match action {
            UserAction::Quit => return Flow::Quit,
            UserAction::AverageScore => {
                self.display.write(DisplayLine::plain(format!(
                    "Average Score for {}: {:.2}",
                    self.room.name,
                    self.engine.average_score()
                )));
            }
            UserAction::ListOpinions => self.list_opinions(),
            UserAction::Share => match load_share_line(&self.share_dir, &self.room.name) {
                Ok(line) => self.publish_line(UserAction::message(&line)).await,
                Err(err) => {
                    log::warn!("Share failed: {err}");
                    self.display.write_error(format!("share error: {err}"));
                }
            },
            UserAction::Connect(addr) => self.connect(&addr).await,
            UserAction::Put(stock) => self.put(&stock),
            UserAction::Get(stock) => self.get(&stock),
            UserAction::Help => self.help(),
            UserAction::Unknown(command) => {
                self.display
                    .write_error(format!("unknown command: {command} (try /help)"));
            }
            action @ (UserAction::Publish(_) | UserAction::PublishOpinion(_)) => {
                self.publish_line(action).await;
            }
        }
        Flow::Continue
    }

    async fn publish_line(&mut self, action: UserAction) {
        match action {
            UserAction::Publish(text) => {
                match self.network.publish(&self.room, text.clone()).await {
                    Ok(()) => self.echo(text),
                    Err(err) => self.display.write_error(format!("publish error: {err}")),
                }
            }
            UserAction::PublishOpinion(payload) => {
                let mut record = match OpinionRecord::from_payload(&payload) {
                    Ok(record) => record,
                    Err(err) => {
                        self.display.write_error(format!("opinion not sent: {err}"));
                        return;
                    }
                };
                record.author = self.room.nick.clone();
                record.revision = self.engine.next_revision();
                self.own_opinions
                    .insert(record.stock.clone(), record.clone());

                let line = opinion_line(&record);
                match self.network.publish_opinion(&self.room, record).await {
                    Ok(()) => self.echo(line),
                    Err(err) => self.display.write_error(format!("publish error: {err}")),
                }
            }
            other => log::debug!("Not a publishable action: {other:?}"),
        }
    }

    fn echo(&self, text: String) {
        self.display.write(DisplayLine::tagged(
            LineColor::Yellow,
            format!("<{}>:", self.room.nick),
            text,
        ));
    }

    fn list_opinions(&self) {
        self.display.write(DisplayLine::colored(
            LineColor::Blue,
            "Listing All Received Opinions:",
        ));
        let opinions = self.engine.list_opinions();
        if opinions.is_empty() {
            self.display
                .write(DisplayLine::plain("No opinions have been received"));
        }
        for record in opinions {
            self.display.write(DisplayLine::plain(listing_line(record)));
        }
    }

    fn help(&self) {
        self.display
            .write(DisplayLine::colored(LineColor::Blue, "Commands:"));
        for (command, about) in input::HELP {
            self.display
                .write(DisplayLine::plain(format!("  {command:<22} {about}")));
        }
        self.display.write(DisplayLine::plain(
            "Lines containing `{` are sent as opinions, e.g. {\"stock\": \"ACME\", \"score\": 7, \"text\": \"steady\"}",
        ));
    }

    async fn connect(&mut self, addr: &str) {
        let address: Multiaddr = match addr.parse() {
            Ok(address) => address,
            Err(err) => {
                self.display
                    .write_error(format!("invalid multiaddr `{addr}`: {err}"));
                return;
            }
        };
        let has_peer_id = matches!(address.iter().last(), Some(Protocol::P2p(_)));
        match self.network.connect(address).await {
            Ok(()) => {
                self.display
                    .write(DisplayLine::plain(format!("Dialing {addr}")));
                // Only /p2p addresses can be used for bootstrap.
                if has_peer_id {
                    persist_bootstrap_node(&self.config_path, addr);
                }
            }
            Err(err) => self.display.write_error(format!("connect error: {err}")),
        }
    }

    fn put(&self, stock: &str) {
        let Some(record) = self.own_opinions.get(stock) else {
            self.display
                .write_error(format!("you have not published an opinion on {stock}"));
            return;
        };
        let key = record.store_key(&self.room.name);
        let value = match record.to_payload() {
            Ok(payload) => payload.into_bytes(),
            Err(err) => {
                self.display.write_error(format!("put error: {err}"));
                return;
            }
        };

        let network = self.network.clone();
        let display = self.display.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {}
                result = network.put_record(key.clone(), value) => match result {
                    Ok(()) => display.write(DisplayLine::plain(format!("Stored {key}"))),
                    Err(err) => display.write_error(format!("put error: {err}")),
                },
            }
        });
    }

    fn get(&self, stock: &str) {
        let key = crate::opinion::store_key(&self.room.name, stock);
        let network = self.network.clone();
        let display = self.display.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {}
                result = network.get_record(key.clone()) => show_record(&display, &key, result),
            }
        });
    }

    pub fn handle_network_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::MessageReceived { room, message } => {
                if room != self.room.name {
                    log::debug!("Ignoring message for room {room}");
                    return;
                }
                self.on_room_message(message);
            }
            NetworkEvent::PeerConnected(peer_id) => {
                self.peers.register(peer_id);
            }
            NetworkEvent::PeerDisconnected(peer_id) => {
                self.peers.remove(&peer_id);
            }
            NetworkEvent::PeerJoinedRoom { peer_id, room } => {
                self.peers.join_room(peer_id, &room);
            }
            NetworkEvent::PeerLeftRoom { peer_id, room } => {
                self.peers.leave_room(&peer_id, &room);
            }
            NetworkEvent::Listening(addr) => {
                self.display
                    .write(DisplayLine::plain(format!("Listening on {addr}")));
            }
        }
    }

    fn on_room_message(&mut self, message: crate::common::ChatMessage) {
        let sender = message.sender_id.clone();
        match self.engine.on_message(message) {
            Ok(Reconciled::Chat { nick, text }) => {
                self.display.write(DisplayLine::tagged(
                    LineColor::Green,
                    format!("<{nick}>:"),
                    text,
                ));
            }
            Ok(Reconciled::Opinion { record, change }) => {
                log::debug!("{change:?} opinion {}/{}", record.author, record.stock);
                self.display.write(DisplayLine::tagged(
                    LineColor::Green,
                    format!("<{}>:", record.author),
                    opinion_line(&record),
                ));
            }
            Err(err) => log::warn!("Dropping message from {sender}: {err}"),
        }
    }

    /// Pushes the current room membership to the peer panel.
    pub fn refresh_peers(&self) {
        self.display
            .set_peers(self.peers.room_members(&self.room.name));
    }
}

fn show_record(display: &Display, key: &str, result: Result<Option<Vec<u8>>, ChatError>) {
    match result {
        Ok(Some(bytes)) => match OpinionRecord::from_bytes(&bytes) {
            Ok(record) => display.write(DisplayLine::tagged(
                LineColor::Blue,
                format!("{key}:"),
                listing_line(&record),
            )),
            Err(_) => display.write(DisplayLine::tagged(
                LineColor::Blue,
                format!("{key}:"),
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
        },
        Ok(None) => display.write(DisplayLine::plain(format!("No record stored under {key}"))),
        Err(err @ ChatError::ValidationRejected { .. }) => {
            display.write_error(format!("get rejected: {err}"));
        }
        Err(err) => display.write_error(format!("get error: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatMessage, NetworkCommand};
    use libp2p::PeerId;
    use tokio::time::{Instant, sleep};

    #[derive(Debug)]
    enum Seen {
        Publish(String),
        Opinion(OpinionRecord),
        Put(String, Vec<u8>),
        Get(String),
        Connect(Multiaddr),
    }

    /// Stands in for the network task: answers every command and reports
    /// what it was asked to do.
    fn fake_network(publish_ok: bool) -> (NetworkHandle, mpsc::UnboundedReceiver<Seen>) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                match command {
                    NetworkCommand::JoinRoom { name, reply } => {
                        let _ = reply.send(Ok(RoomHandle::new(&name, "me", PeerId::random())));
                    }
                    NetworkCommand::Publish { room, text, reply } => {
                        let _ = seen_tx.send(Seen::Publish(text));
                        let _ = reply.send(if publish_ok {
                            Ok(())
                        } else {
                            Err(ChatError::NotConnected(room.name))
                        });
                    }
                    NetworkCommand::PublishOpinion { record, reply, .. } => {
                        let _ = seen_tx.send(Seen::Opinion(record));
                        let _ = reply.send(Ok(()));
                    }
                    NetworkCommand::ConnectToPeer { address, reply } => {
                        let _ = seen_tx.send(Seen::Connect(address));
                        let _ = reply.send(Ok(()));
                    }
                    NetworkCommand::PutRecord { key, value, reply } => {
                        let _ = seen_tx.send(Seen::Put(key, value));
                        let _ = reply.send(Ok(()));
                    }
                    NetworkCommand::GetRecord { key, reply } => {
                        let _ = seen_tx.send(Seen::Get(key.clone()));
                        let answer = if key.ends_with("/MISSING") {
                            Ok(None)
                        } else if key.ends_with("/BAD") {
                            Err(ChatError::rejected(key, "stock mismatch"))
                        } else {
                            let record = OpinionRecord::new("carol", "ACME", 4, "fine");
                            Ok(Some(record.to_payload().unwrap().into_bytes()))
                        };
                        let _ = reply.send(answer);
                    }
                }
            }
        });
        (NetworkHandle::new(cmd_tx), seen_rx)
    }

    struct Fixture {
        dispatcher: Dispatcher,
        display: Display,
        seen: mpsc::UnboundedReceiver<Seen>,
        _shutdown: watch::Sender<bool>,
        dir: tempfile::TempDir,
    }

    fn fixture(publish_ok: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let (network, seen) = fake_network(publish_ok);
        let display = Display::new("Room: tech");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let room = RoomHandle::new("tech", "me", PeerId::random());
        let dispatcher = Dispatcher::new(
            room,
            display.clone(),
            network,
            dir.path().join("stocks-me"),
            dir.path().join("config.json").to_string_lossy().into_owned(),
            shutdown_rx,
        );
        Fixture {
            dispatcher,
            display,
            seen,
            _shutdown: shutdown_tx,
            dir,
        }
    }

    fn opinion_from(nick: &str, stock: &str, score: i64) -> NetworkEvent {
        let payload = OpinionRecord::new("spoofed", stock, score, "note")
            .to_payload()
            .unwrap();
        NetworkEvent::MessageReceived {
            room: "tech".into(),
            message: ChatMessage::opinion(format!("id-{nick}"), nick.into(), payload, 0),
        }
    }

    fn last_text(display: &Display) -> String {
        display.lines().last().map(|line| line.text.clone()).unwrap_or_default()
    }

    async fn wait_for_line(display: &Display, needle: &str) -> DisplayLine {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(line) = display
                .lines()
                .into_iter()
                .find(|line| line.text.contains(needle))
            {
                return line;
            }
            assert!(Instant::now() < deadline, "no line containing {needle:?}");
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn average_uses_float_division() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_input("/avgscore").await;
        assert_eq!(last_text(&fx.display), "Average Score for tech: 0.00");

        fx.dispatcher.handle_network_event(opinion_from("alice", "ACME", 3));
        fx.dispatcher.handle_network_event(opinion_from("bob", "ACME", 4));
        fx.dispatcher.handle_input("/avgscore").await;
        assert_eq!(last_text(&fx.display), "Average Score for tech: 3.50");
    }

    #[tokio::test]
    async fn malformed_opinion_is_dropped_and_loop_continues() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_network_event(NetworkEvent::MessageReceived {
            room: "tech".into(),
            message: ChatMessage::opinion("id-alice".into(), "alice".into(), "not json".into(), 0),
        });
        assert!(fx.dispatcher.engine.is_empty());

        fx.dispatcher.handle_network_event(opinion_from("alice", "ACME", 6));
        assert_eq!(fx.dispatcher.engine.get("alice", "ACME").unwrap().score, 6);

        let line = fx.display.lines().pop().unwrap();
        assert_eq!(line.color, LineColor::Green);
        assert_eq!(line.prefix.as_deref(), Some("<alice>:"));
        assert_eq!(line.text, "STOCK OPINION - note | STOCK SCORE - 6");
    }

    #[tokio::test]
    async fn list_opinions_shows_latest_per_author_and_stock() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_input("/listopinions").await;
        assert_eq!(last_text(&fx.display), "No opinions have been received");

        fx.dispatcher.handle_network_event(opinion_from("alice", "ACME", 2));
        fx.dispatcher.handle_network_event(opinion_from("bob", "INIT", -1));
        fx.dispatcher.handle_network_event(opinion_from("alice", "ACME", 9));
        fx.dispatcher.handle_input("/listopinions").await;

        let lines = fx.display.lines();
        let tail: Vec<_> = lines[lines.len() - 3..].iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            tail,
            vec![
                "Listing All Received Opinions:",
                "alice (ACME Stock Rating = 9): note",
                "bob (INIT Stock Rating = -1): note",
            ]
        );
    }

    #[tokio::test]
    async fn own_opinion_is_stamped_and_can_be_put() {
        let mut fx = fixture(true);
        fx.dispatcher
            .handle_input(r#"{"author": "mallory", "stock": "ACME", "score": 7, "text": "up"}"#)
            .await;

        let Some(Seen::Opinion(record)) = fx.seen.recv().await else {
            panic!("expected an opinion publish");
        };
        assert_eq!(record.author, "me");
        assert_eq!(record.revision, 1);
        let echo = fx.display.lines().pop().unwrap();
        assert_eq!(echo.color, LineColor::Yellow);
        assert_eq!(echo.prefix.as_deref(), Some("<me>:"));

        fx.dispatcher.handle_input("/put ACME").await;
        let Some(Seen::Put(key, value)) = fx.seen.recv().await else {
            panic!("expected a put");
        };
        assert_eq!(key, "/opinions/tech/ACME");
        assert_eq!(OpinionRecord::from_bytes(&value).unwrap(), record);
        wait_for_line(&fx.display, "Stored /opinions/tech/ACME").await;
    }

    #[tokio::test]
    async fn invalid_opinion_and_unknown_command_are_not_published() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_input(r#"{"stock": "ACME", "score": 99}"#).await;
        assert_eq!(fx.display.lines().pop().unwrap().color, LineColor::Red);

        fx.dispatcher.handle_input("/frobnicate").await;
        assert!(last_text(&fx.display).contains("unknown command"));

        fx.dispatcher.handle_input("/put ACME").await;
        assert!(last_text(&fx.display).contains("not published an opinion"));
        assert!(fx.seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_errors_are_shown_inline() {
        let mut fx = fixture(false);
        assert_eq!(fx.dispatcher.handle_input("hello").await, Flow::Continue);
        assert!(matches!(fx.seen.recv().await, Some(Seen::Publish(text)) if text == "hello"));
        let line = fx.display.lines().pop().unwrap();
        assert_eq!(line.color, LineColor::Red);
        assert!(line.text.contains("not connected"));
    }

    #[tokio::test]
    async fn get_distinguishes_not_found_from_rejection() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_input("/get MISSING").await;
        wait_for_line(&fx.display, "No record stored under /opinions/tech/MISSING").await;

        fx.dispatcher.handle_input("/get BAD").await;
        let line = wait_for_line(&fx.display, "get rejected").await;
        assert_eq!(line.color, LineColor::Red);

        fx.dispatcher.handle_input("/get ACME").await;
        wait_for_line(&fx.display, "carol (ACME Stock Rating = 4): fine").await;
    }

    #[tokio::test]
    async fn share_publishes_file_contents() {
        let mut fx = fixture(true);
        fx.dispatcher.handle_input("/share").await;
        assert!(last_text(&fx.display).contains("share error"));

        let share_dir = fx.dir.path().join("stocks-me");
        std::fs::create_dir_all(&share_dir).unwrap();
        std::fs::write(
            share_dir.join("tech.txt"),
            r#"{"Stock": "ACME", "Numeric": "5", "Opinion": "holding"}"#,
        )
        .unwrap();
        fx.dispatcher.handle_input("/share").await;

        let Some(Seen::Opinion(record)) = fx.seen.recv().await else {
            panic!("expected an opinion publish");
        };
        assert_eq!((record.stock.as_str(), record.score), ("ACME", 5));
        assert_eq!(record.text, "holding");
    }

    #[tokio::test]
    async fn connect_persists_full_addresses_only() {
        let mut fx = fixture(true);
        let peer = PeerId::random();
        let full = format!("/ip4/10.0.0.1/tcp/4001/p2p/{peer}");

        fx.dispatcher.handle_input("/connect /ip4/10.0.0.2/tcp/4001").await;
        fx.dispatcher.handle_input(&format!("/connect {full}")).await;
        fx.dispatcher.handle_input("/connect not-an-addr").await;
        assert_eq!(fx.display.lines().pop().unwrap().color, LineColor::Red);

        assert!(matches!(fx.seen.recv().await, Some(Seen::Connect(_))));
        assert!(matches!(fx.seen.recv().await, Some(Seen::Connect(_))));
        let config = crate::config::load_config(&fx.dispatcher.config_path);
        assert_eq!(config.bootstrap_nodes, vec![full]);
    }

    #[tokio::test]
    async fn peer_panel_tracks_room_membership() {
        let mut fx = fixture(true);
        let alice = PeerId::random();
        let bob = PeerId::random();

        fx.dispatcher.handle_network_event(NetworkEvent::PeerConnected(alice));
        fx.dispatcher.handle_network_event(NetworkEvent::PeerJoinedRoom {
            peer_id: alice,
            room: "tech".into(),
        });
        fx.dispatcher.handle_network_event(NetworkEvent::PeerJoinedRoom {
            peer_id: bob,
            room: "other".into(),
        });
        fx.dispatcher.refresh_peers();
        assert_eq!(fx.display.peers(), vec![crate::network::short_id(&alice)]);

        fx.dispatcher.handle_network_event(NetworkEvent::PeerDisconnected(alice));
        fx.dispatcher.refresh_peers();
        assert!(fx.display.peers().is_empty());
    }

    #[tokio::test]
    async fn quit_and_shutdown_stop_the_loop() {
        let fx = fixture(true);
        let (input_tx, input_rx) = mpsc::channel(4);
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let display = fx.display.clone();
        let task = tokio::spawn(fx.dispatcher.run(input_rx, event_rx, Duration::from_millis(50)));

        input_tx.send("/quit".into()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(display.close_requested());

        let fx = fixture(true);
        let (_input_tx, input_rx) = mpsc::channel(4);
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(fx.dispatcher.run(input_rx, event_rx, Duration::from_millis(50)));
        fx._shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn gossip_burst_while_publishing_does_not_wedge_the_loop() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<NetworkCommand>(4);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sender = PeerId::random();

        // Answers every publish only after pushing a burst of room traffic,
        // the way the swarm keeps delivering gossip between commands.
        tokio::spawn(async move {
            let mut n = 0u32;
            while let Some(command) = cmd_rx.recv().await {
                for _ in 0..40 {
                    n += 1;
                    let _ = event_tx.send(NetworkEvent::MessageReceived {
                        room: "tech".into(),
                        message: ChatMessage::text(
                            sender.to_string(),
                            "chatty".into(),
                            format!("burst {n}"),
                            0,
                        ),
                    });
                }
                if let NetworkCommand::Publish { reply, .. } = command {
                    let _ = reply.send(Ok(()));
                }
            }
        });

        let display = Display::new("Room: tech");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            RoomHandle::new("tech", "me", PeerId::random()),
            display.clone(),
            NetworkHandle::new(cmd_tx),
            dir.path().join("stocks-me"),
            dir.path().join("config.json").to_string_lossy().into_owned(),
            shutdown_rx,
        );
        let (input_tx, input_rx) = mpsc::channel(32);
        let task = tokio::spawn(dispatcher.run(input_rx, event_rx, Duration::from_millis(50)));

        for i in 0..20 {
            input_tx.send(format!("line {i}")).await.unwrap();
        }
        input_tx.send("/quit".into()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("dispatch loop stalled")
            .unwrap();
        let echoed = display
            .lines()
            .iter()
            .filter(|line| line.color == LineColor::Yellow)
            .count();
        assert_eq!(echoed, 20);
    }
}

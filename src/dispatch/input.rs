use std::fs;
use std::path::Path;

use crate::common::ChatError;

/// One line typed by the user, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Quit,
    AverageScore,
    ListOpinions,
    Share,
    Connect(String),
    Put(String),
    Get(String),
    Help,
    Unknown(String),
    /// A line containing `{`, to be parsed as an opinion.
    PublishOpinion(String),
    Publish(String),
}

impl UserAction {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::message(line));
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };
        let action = match (command, arg) {
            ("/quit", _) => Self::Quit,
            ("/avgscore", _) => Self::AverageScore,
            ("/listopinions", _) => Self::ListOpinions,
            ("/share", _) => Self::Share,
            ("/help", _) => Self::Help,
            ("/connect", addr) if !addr.is_empty() => Self::Connect(addr.to_string()),
            ("/put", stock) if !stock.is_empty() => Self::Put(stock.to_string()),
            ("/get", stock) if !stock.is_empty() => Self::Get(stock.to_string()),
            _ => Self::Unknown(line.to_string()),
        };
        Some(action)
    }

    /// Classifies a non-command line.
    pub fn message(line: &str) -> Self {
        if line.contains('{') {
            Self::PublishOpinion(line.to_string())
        } else {
            Self::Publish(line.to_string())
        }
    }
}

pub const HELP: &[(&str, &str)] = &[
    ("/avgscore", "mean score of all received opinions"),
    ("/listopinions", "list received opinions"),
    ("/share", "publish the contents of <share dir>/<room>.txt"),
    ("/connect <multiaddr>", "dial a peer"),
    ("/put <stock>", "store your latest opinion on <stock> in the DHT"),
    ("/get <stock>", "read the stored opinion on <stock>"),
    ("/quit", "leave the room and exit"),
];

/// Reads `<dir>/<room>.txt` for `/share`.
pub fn load_share_line(dir: &Path, room: &str) -> Result<String, ChatError> {
    let path = dir.join(format!("{room}.txt"));
    let content = fs::read_to_string(&path)?;
    let line = content.trim();
    if line.is_empty() {
        return Err(ChatError::MalformedPayload(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(line.to_string())
}

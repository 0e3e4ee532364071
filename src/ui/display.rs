use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MAX_LINES: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineColor {
    Plain,
    Green,
    Yellow,
    Blue,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub color: LineColor,
    /// Highlighted lead-in such as `<alice>:`.
    pub prefix: Option<String>,
    pub text: String,
}

impl DisplayLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            color: LineColor::Plain,
            prefix: None,
            text: text.into(),
        }
    }

    pub fn tagged(color: LineColor, prefix: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            color,
            prefix: Some(prefix.into()),
            text: text.into(),
        }
    }

    pub fn colored(color: LineColor, text: impl Into<String>) -> Self {
        Self {
            color,
            prefix: None,
            text: text.into(),
        }
    }
}

/// Nội dung đang hiển thị: message log, peer list, title.
#[derive(Debug, Default)]
pub struct Surface {
    pub title: String,
    pub lines: Vec<DisplayLine>,
    pub peers: Vec<String>,
    close_requested: bool,
    repaint: Option<egui::Context>,
    headless: bool,
}

/// Owned copy of the surface, rendered without holding the lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub title: String,
    pub lines: Vec<DisplayLine>,
    pub peers: Vec<String>,
}

/// Shared display surface written by the dispatch loop and the peer
/// refresh, read by the UI thread.
///
/// The lock is held only for the mutation itself; redraws are requested
/// after it is released.
#[derive(Debug, Clone, Default)]
pub struct Display {
    inner: Arc<Mutex<Surface>>,
}

impl Display {
    pub fn new(title: impl Into<String>) -> Self {
        let display = Self::default();
        display.lock().title = title.into();
        display
    }

    /// A display with no window; every line is mirrored to the log.
    pub fn headless(title: impl Into<String>) -> Self {
        let display = Self::new(title);
        display.lock().headless = true;
        display
    }

    fn lock(&self) -> MutexGuard<'_, Surface> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, ctx: egui::Context) {
        self.lock().repaint = Some(ctx);
    }

    fn redraw(ctx: Option<egui::Context>) {
        if let Some(ctx) = ctx {
            ctx.request_repaint();
        }
    }

    pub fn write(&self, line: DisplayLine) {
        let ctx = {
            let mut surface = self.lock();
            if surface.headless {
                match &line.prefix {
                    Some(prefix) => log::info!("{prefix} {}", line.text),
                    None => log::info!("{}", line.text),
                }
            }
            surface.lines.push(line);
            if surface.lines.len() > MAX_LINES {
                let overflow = surface.lines.len() - MAX_LINES;
                surface.lines.drain(..overflow);
            }
            surface.repaint.clone()
        };
        Self::redraw(ctx);
    }

    pub fn write_error(&self, text: impl Into<String>) {
        self.write(DisplayLine::colored(LineColor::Red, text));
    }

    /// Clears the peer panel and fills it with `peers`.
    pub fn set_peers(&self, peers: Vec<String>) {
        let ctx = {
            let mut surface = self.lock();
            if surface.peers == peers {
                return;
            }
            surface.peers.clear();
            surface.peers.extend(peers);
            surface.repaint.clone()
        };
        Self::redraw(ctx);
    }

    pub fn request_close(&self) {
        let ctx = {
            let mut surface = self.lock();
            surface.close_requested = true;
            surface.repaint.clone()
        };
        Self::redraw(ctx);
    }

    pub fn close_requested(&self) -> bool {
        self.lock().close_requested
    }

    /// Runs `f` against the current surface under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Surface) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read(|surface| Snapshot {
            title: surface.title.clone(),
            lines: surface.lines.clone(),
            peers: surface.peers.clone(),
        })
    }

    pub fn lines(&self) -> Vec<DisplayLine> {
        self.read(|surface| surface.lines.clone())
    }

    pub fn peers(&self) -> Vec<String> {
        self.read(|surface| surface.peers.clone())
    }
}

pub mod app;
pub mod components;
pub mod display;

pub use app::ChatApp;
pub use display::{Display, DisplayLine, LineColor};

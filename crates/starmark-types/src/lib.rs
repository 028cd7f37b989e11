//! Shared types for the Starmark favorites subsystem.

mod chat;
mod favorite;
mod preview;
mod settings;

pub use chat::*;
pub use favorite::*;
pub use preview::*;
pub use settings::*;

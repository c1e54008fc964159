//! Wire types shared by the extractor and the transport session.

pub mod envelope;
pub mod events;

pub use envelope::{ArbitraryJson, ClientMessage, ServerMessage};
pub use events::ChangeEvent;

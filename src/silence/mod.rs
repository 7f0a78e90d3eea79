mod gossip;
mod silence;
mod state;

pub use gossip::{Delta, GossipTransport, SilenceGossipAdapter, DEFAULT_MAX_CHUNK_BYTES};
pub use silence::{Silence, SilenceStatus};
pub use state::SilenceState;

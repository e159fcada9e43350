//! Transport-side plumbing: channel names, capability tokens, publishing to
//! the pub/sub transport, and the media-routing service.

pub mod broker;
pub mod channels;
pub mod connection;
pub mod fanout;
pub mod publisher;
pub mod sfu;
pub mod tokens;

pub use broker::LocalBroker;
pub use fanout::EventFanout;
pub use publisher::{CentrifugoPublisher, Publisher};
pub use sfu::{LiveKitRooms, MediaRooms, RoomSettings, VoiceGrants};
pub use tokens::{TokenIssuer, TokenVerifier};

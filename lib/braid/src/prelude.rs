//! The names a protlet implementation usually needs.

pub use crate::engine::Engine;
pub use crate::message::{IncomingMessage, MessageError, MsgRead, MsgWrite, OutgoingMessage};
pub use crate::net::multiplexer::run_protlet;
pub use crate::net::transport::PeerInfo;
pub use crate::peerset::VectorPeerSet;
pub use crate::protlet::{
    Action, Context, Finished, Promise, Protlet, ProtletId, ID_INVALID, ROOT_ID,
};
pub use keel::logging;
pub use keel::Identity;

//! Live connection to the Inference Session.
//!
//! [`messages`] defines the JSON wire shapes, [`client`] the WebSocket
//! transport plus the [`LiveEvent`] stream the session manager consumes.
//! Production code connects through [`WsConnector`]; tests substitute any
//! [`LiveConnector`] that yields a scripted [`LiveConnection`].

pub mod client;
pub mod messages;

pub use client::{LiveConnection, LiveConnector, LiveEvent, LiveSender, WsConnector};
pub use messages::{
    ClientMessage, InlineData, MediaChunk, ModelTurn, RealtimeInput, ServerContent, ServerMessage,
    ServerPart, SessionSetup, SetupComplete, ToolCallPayload, ToolResponsePayload,
};

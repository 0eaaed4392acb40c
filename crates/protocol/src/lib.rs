//! rekor-protocol – Signaling-Protokoll
//!
//! Dieses Crate definiert alle Events, die zwischen Clients und dem Relay
//! ausgetauscht werden, sowie das frame-basierte TCP-Wire-Format.

pub mod events;
pub mod wire;

pub use events::{
    AlterName, ClientEvent, ErrorCode, ServerEvent, Signal, SignalKind, SignalPayload,
};
pub use wire::{ClientCodec, FrameCodec, ServerCodec};

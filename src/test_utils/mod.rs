//! In-process doubles for exercising the connection layer without a server.
//!
//! [`ScriptedAdapter`] records every native call and replays queued results;
//! [`ScriptedDriver`] hands out clones of one adapter and can fail a fixed number
//! of connection attempts first.

mod scripted;

pub use scripted::{Call, ScriptedAdapter, ScriptedDriver, ScriptedResult};

//! peerwatch-tunnel — boundary to the tunnel-management layer.
//!
//! The monitor never talks to WireGuard directly. It consumes explicit
//! input structs (`InterfaceState`, `PeerReport`, `HandshakeValue`)
//! through the `TunnelSource` trait, and issues keepalive corrections
//! through the same trait.
//!
//! # Command discipline
//!
//! `WgCli`, the production `TunnelSource`, drives the `wg`/`awg` tools
//! through `CommandRunner`:
//!
//! - executables come only from fixed allow-listed paths
//! - interface names and peer keys are regex-validated before any command
//!   is composed
//! - arguments are passed as a vector, never through a shell
//! - root-only commands are prefixed with `sudo --non-interactive` when
//!   the process is not already root
//! - every invocation is bounded by a timeout and killed when it expires

pub mod command;
pub mod error;
pub mod source;
pub mod types;
pub mod wg;

pub use command::{CommandRunner, Tool};
pub use error::{TunnelError, TunnelResult};
pub use source::{BoxFuture, TunnelSource};
pub use types::*;
pub use wg::{WgCli, WgInterface};

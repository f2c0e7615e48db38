//! The `TunnelSource` seam between the monitor and the tunnel layer.

use std::future::Future;
use std::pin::Pin;

use crate::error::TunnelResult;
use crate::types::{InterfaceState, PeerReport, Protocol};

/// Boxed future alias for `TunnelSource` methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read/command surface of the tunnel-management layer. Injected so the
/// monitor can be exercised without real interfaces.
pub trait TunnelSource: Send + Sync {
    /// All interfaces the layer knows about, up or down.
    fn list_interfaces(&self) -> BoxFuture<'_, TunnelResult<Vec<InterfaceState>>>;

    /// Peers currently configured on an interface.
    fn list_peers<'a>(
        &'a self,
        interface: &'a InterfaceState,
    ) -> BoxFuture<'a, TunnelResult<Vec<PeerReport>>>;

    /// Set a peer's persistent-keepalive on the live device.
    fn set_keepalive<'a>(
        &'a self,
        interface: &'a str,
        protocol: Protocol,
        peer: &'a str,
        seconds: u16,
    ) -> BoxFuture<'a, TunnelResult<()>>;
}

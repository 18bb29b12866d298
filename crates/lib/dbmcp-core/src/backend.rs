//! Capability interface implemented by each backend family.

use std::error::Error;
use std::future::Future;

/// Opens and closes live handles for one backend family.
///
/// A connector is selected once when the gateway is built; the cache calls
/// [`Connector::open`] on the first resolution of a backend name and
/// [`Connector::close`] when that name is disconnected. The family-specific
/// operation surface lives on [`Connector::Handle`].
pub trait Connector: Send + Sync + 'static {
    /// Immutable connection parameters for one backend.
    type Config: Send + Sync + 'static;
    /// Live connection or pool bound to exactly one backend name.
    type Handle: Send + Sync + 'static;
    /// Driver failure surfaced while opening or closing.
    type Error: Error + Send + Sync + 'static;

    /// Builds a handle for `name` and performs any handshake it needs.
    fn open(
        &self,
        name: &str,
        config: &Self::Config,
    ) -> impl Future<Output = Result<Self::Handle, Self::Error>> + Send;

    /// Disposes a handle previously returned by [`Connector::open`].
    fn close(&self, handle: &Self::Handle) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

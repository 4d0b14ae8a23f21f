//! Online reachability gate used to decide whether remote providers are
//! worth attempting.

mod gate;
mod probe;

pub use gate::{ConnectivityGate, ConnectivityVerdict};
pub use probe::ReachabilityProbe;

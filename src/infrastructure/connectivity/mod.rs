pub mod monitor;

pub use monitor::{ConnectivityHandle, NetworkStatusMonitor};

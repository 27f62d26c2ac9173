pub mod connectivity;
pub mod local_store;
pub mod remote_source;

pub use connectivity::{ConnectivityMonitor, ConnectivityStream};
pub use local_store::{LocalStore, StorePredicate};
pub use remote_source::{
    RemoteDataSource, RemoteError, RemoteResult, RemoteSnapshot, RemoteSubscription, RemoteWrite,
};

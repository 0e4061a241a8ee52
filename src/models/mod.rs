//! Request and result models: credentials, destinations and remote entries.

pub mod credentials;
pub mod destination;
pub mod remote_file;

pub use credentials::{ClientIdentity, Credentials, TlsMode, TlsSettings};
pub use destination::{resolve, Destination, ParsedDestination};
pub use remote_file::{join_remote_path, split_remote_path, RemoteFile, RemoteFileContent};

//! Secured directory server.
//!
//! Issues and verifies time-limited, tamper-proof URLs granting read
//! access to a single file under an instance's working directory or a
//! staging task's container mount, with path-traversal protection.

mod codec;
mod server;

pub use codec::{UrlSigner, VerifyError};
pub use server::DirectoryServer;

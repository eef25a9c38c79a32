//! Backend interfaces and clients for the Atelier engine.
//!
//! Defines the session/job and theme transform backend traits, their REST
//! implementations, the offline keyword transform, and client
//! configuration loaded from the environment.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod keyword;

pub use backend::{
    require_credential, Credential, CredentialProvider, SessionBackend, SessionSnapshot,
    SnapshotJob, StaticCredential, ThemeTransformBackend,
};
pub use config::ClientConfig;
pub use error::ClientError;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::AdapterIdentity;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("dynamic backend module is already bound")]
    AlreadyBound,

    #[error("loading backend module {path} failed: {source}")]
    ModuleLoadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backend module has no entry point {name}: {source}")]
    MissingEntryPoint {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("creating adapter failed: {source}")]
    BackendCreateFailed {
        #[source]
        source: io::Error,
    },

    #[error("deleting adapter {identity} failed: {source}")]
    BackendDeleteFailed {
        identity: AdapterIdentity,
        #[source]
        source: io::Error,
    },

    #[error("renaming adapter {identity} to \"{name}\" failed: {source}")]
    BackendRenameFailed {
        identity: AdapterIdentity,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("enumerating adapters failed: {source}")]
    BackendListFailed {
        #[source]
        source: io::Error,
    },

    #[error("adapter \"{name}\" already exists ({identity})")]
    DuplicateName {
        name: String,
        identity: AdapterIdentity,
    },

    #[error("adapter \"{target}\" not found")]
    NotFound { target: String },

    #[error("\"{literal}\" is not a GUID: {source}")]
    InvalidIdentitySyntax {
        literal: String,
        #[source]
        source: uuid::Error,
    },

    #[error("no device-class adapter service is available on this host")]
    LegacyUnavailable,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

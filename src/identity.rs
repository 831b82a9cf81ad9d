use std::fmt;

use uuid::Uuid;

use crate::error::{AdapterError, Result};

/// 128-bit adapter GUID. The only identity shared by both backends, stable
/// for the adapter's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterIdentity(Uuid);

impl AdapterIdentity {
    /// Builds an identity from the mixed-endian GUID layout used by the
    /// dynamic backend's adapter descriptors.
    pub fn from_guid_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Mixed-endian GUID bytes, as stored in adapter descriptors.
    pub fn to_guid_bytes(self) -> [u8; 16] {
        self.0.to_bytes_le()
    }

    /// Parses a GUID literal (braced, hyphenated or bare hex). A lexical
    /// failure here is what triggers name fallback in delete resolution.
    pub fn parse(literal: &str) -> Result<Self> {
        Uuid::try_parse(literal.trim())
            .map(Self)
            .map_err(|source| AdapterError::InvalidIdentitySyntax {
                literal: literal.to_string(),
                source,
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AdapterIdentity {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for AdapterIdentity {
    /// Braced uppercase registry form, matching what operators see in
    /// device manager and what the legacy tooling prints.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        write!(f, "{{{}}}", self.0.hyphenated().encode_upper(&mut buf))
    }
}

/// Which driver family owns an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Legacy kernel-driver family reached through device-class enumeration.
    DeviceClass,
    /// Dynamically loaded user-mode-friendly driver module.
    Dynamic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::DeviceClass => write!(f, "device-class"),
            BackendKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Point-in-time snapshot of one adapter, produced only by enumeration.
#[derive(Debug, Clone)]
pub struct AdapterRecord {
    pub identity: AdapterIdentity,
    pub name: String,
    pub hardware_id: String,
    pub backend: BackendKind,
}

/// A delete argument, resolved GUID-first. GUIDs have an unambiguous lexical
/// form, so the reverse order would never be correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Identity(AdapterIdentity),
    Name(String),
}

impl DeleteTarget {
    pub fn parse(argument: &str) -> Self {
        match AdapterIdentity::parse(argument) {
            Ok(identity) => DeleteTarget::Identity(identity),
            Err(_) => DeleteTarget::Name(argument.to_string()),
        }
    }
}

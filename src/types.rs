use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// An identifier was empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} must not be empty")]
pub struct EmptyId {
    pub kind: &'static str,
}

/// Backends hand out ids as either JSON strings or integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

macro_rules! non_empty_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, EmptyId> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(EmptyId { kind: $kind });
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = EmptyId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = match RawId::deserialize(deserializer)? {
                    RawId::Text(s) => s,
                    RawId::Number(n) => n.to_string(),
                };
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

non_empty_id!(
    /// Server-owned event (gallery) identifier.
    EventId,
    "event id"
);
non_empty_id!(
    /// Subject issued by the identity service for this device.
    SubjectId,
    "subject id"
);
non_empty_id!(
    /// Opaque reference returned by object storage once bytes are stored.
    MediaReference,
    "media reference"
);
non_empty_id!(
    /// Server-assigned id of a registered asset row.
    AssetId,
    "asset id"
);

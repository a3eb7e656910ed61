// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connector error types.
//
// One enum covers every failure a client can observe: configuration
// problems found at construction, local entity validation, payload decode
// failures, operations a backend does not offer, and errors raised by the
// backend drivers themselves. Driver errors are carried as their original
// boxed value so callers can downcast to the driver's own error type.
// Not-found is never an error.

use thiserror::Error;

use crate::config::ConnectorKind;

/// Boxed driver error, kept intact for downcasting.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when talking to a connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The configuration section is missing, incomplete or names an
    /// unknown / disabled backend. Fatal at client construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// An entity could not be built from the caller's key and value.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// A stored payload could not be decoded into the requested type.
    #[error("failed to decode payload for key '{key}': {message}")]
    Decode {
        /// Key of the entity whose payload failed to decode.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// A stored envelope is not in the expected shape.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The selected backend does not offer this operation.
    #[error("{operation} is not supported by the {backend} connector")]
    Unsupported {
        /// Backend that rejected the call.
        backend: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// An error raised by a backend driver, propagated unchanged.
    #[error("{backend} driver error: {source}")]
    Driver {
        /// Backend whose driver failed.
        backend: ConnectorKind,
        /// The driver's own error.
        #[source]
        source: BoxError,
    },

    /// A REST-speaking backend answered with a non-success status.
    #[error("{backend} returned HTTP {status}: {message}")]
    Http {
        /// Backend that answered.
        backend: ConnectorKind,
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// An I/O error outside of any driver (e.g. reading a config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Wrap a driver error for `backend`.
    pub fn driver<E>(backend: ConnectorKind, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Driver {
            backend,
            source: source.into(),
        }
    }

    /// Shorthand for an `Unsupported` error.
    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { backend, operation }
    }

    /// True for errors raised while building a client.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Convenience alias used throughout the crate.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

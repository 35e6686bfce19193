//! Safe-mode error checks.
//!
//! After a write, the pipeline asks the [`ErrorGate`] to inspect one of the
//! connection's error slots. Checks are no-ops unless safe mode was requested for
//! the call; otherwise an error found in the slot is turned into a fault by the
//! connection's [`ErrorTranslator`]. The gate only reads. Resetting slots is the
//! caller's job.

use std::fmt::Debug;
use tracing::debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    session::{Connection, ErrorDescriptor},
    transport::{Namespace, Transport},
};

/// Codes the store uses for unique index violations.
const DUPLICATE_KEY_CODES: [i32; 2] = [11000, 11001];

/// Turns an error descriptor into the fault raised to the caller.
pub trait ErrorTranslator: Send + Sync + Debug {
    fn translate(&self, namespace: &Namespace, descriptor: &ErrorDescriptor) -> DocumentStoreError;
}

/// Maps duplicate key failures to [`DocumentStoreError::DuplicateKey`] and everything
/// else to [`DocumentStoreError::Safemode`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorTranslator;

impl ErrorTranslator for DefaultErrorTranslator {
    fn translate(&self, namespace: &Namespace, descriptor: &ErrorDescriptor) -> DocumentStoreError {
        let message = descriptor
            .message
            .clone()
            .unwrap_or_default();

        let duplicate = descriptor
            .code
            .is_some_and(|code| DUPLICATE_KEY_CODES.contains(&code))
            || message.starts_with("E11000");

        if duplicate {
            DocumentStoreError::DuplicateKey {
                namespace: namespace.to_string(),
                message,
            }
        } else {
            DocumentStoreError::Safemode {
                namespace: namespace.to_string(),
                code: descriptor.code,
                message,
            }
        }
    }
}

/// Reads a connection's error slots on behalf of one namespace.
#[derive(Debug)]
pub struct ErrorGate<'a, B: Transport> {
    connection: &'a Connection<B>,
    namespace: &'a Namespace,
}

impl<'a, B: Transport> ErrorGate<'a, B> {
    pub fn new(connection: &'a Connection<B>, namespace: &'a Namespace) -> Self {
        Self { connection, namespace }
    }

    /// Raises a fault if safe mode is on and the last operation failed.
    pub async fn check_last_error(&self, safe_mode: bool) -> DocumentStoreResult<()> {
        if !safe_mode {
            return Ok(());
        }

        self.raise_if_error(self.connection.last_error().await)
    }

    /// Raises a fault if safe mode is on and a failure is recorded since the last reset.
    pub async fn check_previous_error(&self, safe_mode: bool) -> DocumentStoreResult<()> {
        if !safe_mode {
            return Ok(());
        }

        self.raise_if_error(self.connection.previous_error().await)
    }

    fn raise_if_error(&self, descriptor: ErrorDescriptor) -> DocumentStoreResult<()> {
        if !descriptor.is_error() {
            return Ok(());
        }

        debug!(namespace = %self.namespace, code = ?descriptor.code, "safe-mode check found an error");
        Err(self
            .connection
            .options()
            .translator
            .translate(self.namespace, &descriptor))
    }
}

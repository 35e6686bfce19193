//! Store-level failures raised while evaluating selectors, updates and commands.

use docwire_core::{error::DocumentStoreError, session::ErrorDescriptor};

pub(crate) const BAD_VALUE: i32 = 2;
pub(crate) const FAILED_TO_PARSE: i32 = 9;
pub(crate) const TYPE_MISMATCH: i32 = 14;
pub(crate) const NAMESPACE_NOT_FOUND: i32 = 26;
pub(crate) const PATH_NOT_VIABLE: i32 = 28;
pub(crate) const COMMAND_NOT_FOUND: i32 = 59;
pub(crate) const IMMUTABLE_FIELD: i32 = 66;
pub(crate) const DUPLICATE_KEY: i32 = 11000;

/// A coded failure, reported as a write outcome or a command error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fault {
    pub(crate) code: i32,
    pub(crate) message: String,
}

impl Fault {
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn bad_value(message: impl Into<String>) -> Self {
        Self::new(BAD_VALUE, message)
    }

    pub(crate) fn into_descriptor(self) -> ErrorDescriptor {
        ErrorDescriptor::failure(self.code, self.message)
    }

    pub(crate) fn into_command_error(self, command: &str) -> DocumentStoreError {
        DocumentStoreError::command(command, self.code, self.message)
    }
}

use nspan_vmem::Protection;
use thiserror::Error;

/// The error type for allocator operations.
///
/// Carries a boxed [`ErrorKind`] so that `Result<T>` stays a single word on
/// the success path.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn disposed(operation: impl Into<String>) -> Error {
        Error(
            ErrorKind::Disposed {
                operation: operation.into(),
            }
            .into(),
        )
    }

    pub fn allocation(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Allocation {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn protection(requested: Protection, source: std::io::Error) -> Error {
        Error(ErrorKind::Protection { requested, source }.into())
    }

    pub fn out_of_bounds(index: usize, len: usize) -> Error {
        Error(ErrorKind::OutOfBounds { index, len }.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The allocator has been disposed, or its region was transferred to
    /// another instance.
    #[error("allocator is disposed: {operation}")]
    Disposed { operation: String },

    /// The platform refused to reserve or commit the region.
    #[error("failed to acquire memory region: {context}")]
    Allocation {
        context: String,
        source: std::io::Error,
    },

    /// The platform refused a protection change.
    #[error("failed to change region protection to {requested}")]
    Protection {
        requested: Protection,
        source: std::io::Error,
    },

    /// A view access outside `[0, len)`.
    #[error("index {index} out of bounds for view of length {len}")]
    OutOfBounds { index: usize, len: usize },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

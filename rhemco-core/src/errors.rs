use thiserror::Error;

/// Broad classification of a failure.
///
/// Hosts use this to decide whether a failure can be recovered from.
/// `Allocation` is fatal; the other kinds are recoverable, although the host
/// usually treats a failure during initialisation as fatal for the run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A backing buffer could not be sized
    Allocation,
    /// A species, instance or extension handle was not present
    NotFound,
    /// The configuration is not in a usable state or is malformed
    Configuration,
}

impl ErrorKind {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::Allocation)
    }
}

/// Error type for runtime state and extension registry operations.
#[derive(Error, Debug)]
pub enum HcoError {
    #[error("Could not allocate {what} ({requested} elements)")]
    Allocation { what: String, requested: usize },
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("{operation} failed: {source}")]
    Context {
        operation: &'static str,
        #[source]
        source: Box<HcoError>,
    },
}

impl HcoError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        HcoError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        HcoError::Configuration(message.into())
    }

    /// Wrap this error with the name of the operation that failed.
    pub fn context(self, operation: &'static str) -> Self {
        HcoError::Context {
            operation,
            source: Box::new(self),
        }
    }

    /// The kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HcoError::Allocation { .. } => ErrorKind::Allocation,
            HcoError::NotFound { .. } => ErrorKind::NotFound,
            HcoError::Configuration(_) => ErrorKind::Configuration,
            HcoError::Context { source, .. } => source.kind(),
        }
    }

    /// Operation names from the outermost to the innermost context.
    ///
    /// Hosts can print this as a traceback.
    pub fn traceback(&self) -> Vec<&'static str> {
        let mut operations = vec![];
        let mut current = self;
        while let HcoError::Context { operation, source } = current {
            operations.push(*operation);
            current = source;
        }
        operations
    }
}

/// Convenience type for `Result<T, HcoError>`.
pub type HcoResult<T> = Result<T, HcoError>;

/// Attach an operation name to the error of a result.
pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> HcoResult<T>;
}

impl<T> ResultExt<T> for HcoResult<T> {
    fn context(self, operation: &'static str) -> HcoResult<T> {
        self.map_err(|e| e.context(operation))
    }
}

/// Reserve exactly `n` elements, reporting failure as [`HcoError::Allocation`].
pub(crate) fn try_with_capacity<T>(n: usize, what: &str) -> HcoResult<Vec<T>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(n)
        .map_err(|_| HcoError::Allocation {
            what: what.to_string(),
            requested: n,
        })?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_taken_from_innermost_error() {
        let err = HcoError::not_found("instance", 3)
            .context("InstanceGet")
            .context("Custom::run");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.traceback(), vec!["Custom::run", "InstanceGet"]);
        assert!(err.to_string().starts_with("Custom::run failed"));
    }

    #[test]
    fn test_allocation_is_not_recoverable() {
        assert!(!ErrorKind::Allocation.is_recoverable());
        assert!(ErrorKind::NotFound.is_recoverable());
        assert!(ErrorKind::Configuration.is_recoverable());
    }

    #[test]
    fn test_capacity_overflow_is_reported() {
        let result = try_with_capacity::<u64>(usize::MAX, "test buffer");
        match result {
            Err(HcoError::Allocation { what, requested }) => {
                assert_eq!(what, "test buffer");
                assert_eq!(requested, usize::MAX);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}

use std::error;
use std::fmt;

/// Convenient result type for harness operations using [`HarnessError`] as the error type.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Main error type of the harness.
///
/// [`HarnessError`] can represent a single error, an error with additional detail, or several
/// aggregated errors.
#[derive(Debug, Clone)]
pub struct HarnessError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<HarnessError>),
}

/// Specific categories of errors that can occur in the harness.
///
/// Kinds are grouped by the lifecycle phase that produces them, which also decides how loudly
/// they are reported: setup errors abort a scope, resolution errors fail a single test and
/// teardown errors are only logged.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Setup Errors
    UnknownIdentifier,
    ResourceConstructionFailed,
    ResourceStartFailed,
    ConnectorConstructionFailed,
    CallbackConstructionFailed,
    ConfigError,
    InvalidState,

    // Resolution Errors
    EngineStartTimeout,
    EngineNotRunning,

    // Teardown Errors
    ResourceStopFailed,

    // Runtime Errors
    ConnectorFailed,
    CallbackFailed,
    EnginePanic,

    // Test Body Errors
    TestFailed,
    TestPanic,

    // IO & Serialization Errors
    IoError,
    DatabaseError,
    SerializationError,
    DeserializationError,
    ConversionError,

    // Unknown / Uncategorized
    Unknown,
}

impl HarnessError {
    /// Creates a [`HarnessError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<HarnessError>) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for HarnessError {
    fn eq(&self, other: &HarnessError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for HarnessError {}

/// Creates a [`HarnessError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for HarnessError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`HarnessError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for HarnessError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates a [`HarnessError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for HarnessError
where
    E: Into<HarnessError>,
{
    fn from(errors: Vec<E>) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts [`std::io::Error`] to [`HarnessError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`HarnessError`], classifying I/O failures apart from
/// malformed payloads.
impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> HarnessError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        HarnessError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`std::num::ParseIntError`] to [`HarnessError`] with [`ErrorKind::ConversionError`].
impl From<std::num::ParseIntError> for HarnessError {
    fn from(err: std::num::ParseIntError) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "Integer parsing failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts a configuration [`cdc_harness_config::shared::ValidationError`] into a
/// [`ErrorKind::ConfigError`].
impl From<cdc_harness_config::shared::ValidationError> for HarnessError {
    fn from(err: cdc_harness_config::shared::ValidationError) -> HarnessError {
        HarnessError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigError,
                "Invalid harness configuration",
                err.to_string(),
            ),
        }
    }
}

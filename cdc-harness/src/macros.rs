//! Macros for harness error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::HarnessError`]
//! instances with reduced boilerplate.

/// Creates a [`crate::error::HarnessError`] from error kind and description.
///
/// An optional third argument is rendered with `to_string` and attached as detail.
#[macro_export]
macro_rules! harness_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::HarnessError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::HarnessError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::HarnessError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::harness_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::harness_error!($kind, $desc, $detail))
    };
}

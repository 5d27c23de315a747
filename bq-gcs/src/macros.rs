//! Macros for building and returning [`crate::error::BqGcsError`] values.

/// Creates a [`crate::error::BqGcsError`] from error kind and description.
///
/// The optional third argument is any [`ToString`] value rendered as the error detail. A
/// trailing `source: err` attaches the originating error.
#[macro_export]
macro_rules! bq_gcs_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::BqGcsError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::bq_gcs_error!($kind, $desc).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::BqGcsError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::bq_gcs_error!($kind, $desc, $detail).with_source($source)
    };
}

/// Returns early with a [`crate::error::BqGcsError`] built by [`bq_gcs_error!`].
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::bq_gcs_error!($($args)+))
    };
}

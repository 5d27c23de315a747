use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use bq_gcs::error::BqGcsError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for function service operations.
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Captured backtrace of a non-core error variant.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the function service.
///
/// Wraps [`BqGcsError`] for failures of the extract core and provides variants for startup
/// and server errors.
#[derive(Debug)]
pub enum FunctionError {
    /// Extract core error.
    Core(BqGcsError),
    /// Configuration error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl FunctionError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            FunctionError::Core(_) => "function error",
            FunctionError::Config(_, _) => "configuration error",
            FunctionError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            FunctionError::Core(err) => Some(err.backtrace()),
            FunctionError::Config(_, cb) => Some(&cb.0),
            FunctionError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        FunctionError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("bq-gcs function failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionError::Core(err) => write!(f, "{err}"),
            FunctionError::Config(source, _) => write!(f, "configuration error: {source}"),
            FunctionError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for FunctionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FunctionError::Core(err) => err.source(),
            FunctionError::Config(source, _) => Some(source.as_ref()),
            FunctionError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        FunctionError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<BqGcsError> for FunctionError {
    fn from(err: BqGcsError) -> Self {
        FunctionError::Core(err)
    }
}

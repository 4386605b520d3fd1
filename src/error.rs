//! Shared error classification.
//!
//! Every module-level error enum implements [`ErrorCode`] so callers (the CLI,
//! log lines) get a stable machine-readable code alongside the display text.

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Render an error as `E_CODE: message`, the format the CLI prints on failure.
pub fn describe(err: &(impl ErrorCode + ?Sized)) -> String {
    format!("{}: {err}", err.error_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("thing went missing")]
    struct Missing;

    impl ErrorCode for Missing {
        fn error_code(&self) -> &'static str {
            "E_MISSING"
        }
    }

    #[test]
    fn describe_prefixes_code() {
        assert_eq!(describe(&Missing), "E_MISSING: thing went missing");
    }

    #[test]
    fn retryable_defaults_to_false() {
        assert!(!Missing.retryable());
    }
}

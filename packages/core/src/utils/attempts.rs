//! Best-effort fan-out: many independent attempts, first success wins.

use crate::error::{CascadeError, Result};

/// Pick the first `Ok` in attempt order. When every attempt failed the
/// individual messages are joined into one [`CascadeError::Decryption`];
/// an empty attempt list means nothing was eligible to try at all.
pub fn first_success<T>(results: Vec<Result<T>>) -> Result<T> {
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e.to_string()),
        }
    }

    if errors.is_empty() {
        Err(CascadeError::NoMatchingFragment)
    } else {
        Err(CascadeError::Decryption(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_skips_failures() {
        let results = vec![
            Err(CascadeError::Decryption("bad tag".to_string())),
            Ok(2),
            Ok(3),
        ];
        assert_eq!(first_success(results), Ok(2));
    }

    #[test]
    fn test_all_failures_are_aggregated() {
        let results: Vec<Result<u8>> = vec![
            Err(CascadeError::Decryption("first".to_string())),
            Err(CascadeError::InvalidFormat("second".to_string())),
        ];
        match first_success(results) {
            Err(CascadeError::Decryption(msg)) => {
                assert!(msg.contains("first"));
                assert!(msg.contains("second"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_attempts() {
        let results: Vec<Result<u8>> = Vec::new();
        assert_eq!(first_success(results), Err(CascadeError::NoMatchingFragment));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Turns untrusted identifiers (swarm ids, run ids) into single path segments
//! that cannot escape the directory they are joined under. Used by the file
//! journal to build its per-swarm, per-run layout.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Traversal-safe path components

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path segment: {0}")]
    InvalidSegment(String),

    #[error("Path outside root boundary: {0}")]
    OutsideBoundary(String),

    #[error("Path segment too long: {0}")]
    SegmentTooLong(String),
}

/// Path sanitizer domain service
///
/// # Security Guarantees
/// - Rejects empty, `.` and `..` segments
/// - Rejects NUL bytes
/// - Replaces separators and any other character outside `[A-Za-z0-9._-]`
///   with `_`, so a segment is always exactly one path component
/// - Verifies the joined path stays under the root
pub struct PathSanitizer {
    /// Maximum allowed segment length (default: 128)
    max_segment_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self {
            max_segment_len: 128,
        }
    }

    pub fn with_max_length(max_segment_len: usize) -> Self {
        Self { max_segment_len }
    }

    /// Sanitize one untrusted identifier into a single path segment.
    ///
    /// # Examples
    /// ```
    /// use aegis_core::domain::path_sanitizer::PathSanitizer;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert_eq!(sanitizer.segment("swarm/a b").unwrap(), "swarm_a_b");
    /// assert!(sanitizer.segment("..").is_err());
    /// ```
    pub fn segment(&self, raw: &str) -> Result<String, PathSanitizerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathSanitizerError::InvalidSegment(raw.to_string()));
        }

        if trimmed.contains('\0') {
            tracing::warn!(segment = %raw.escape_debug(), "Path segment contains null byte");
            return Err(PathSanitizerError::InvalidSegment(
                "segment contains null byte".to_string(),
            ));
        }

        if trimmed == "." || trimmed == ".." {
            tracing::warn!(segment = %raw, "Path traversal attempt detected in segment");
            return Err(PathSanitizerError::PathTraversal(raw.to_string()));
        }

        if trimmed.len() > self.max_segment_len {
            return Err(PathSanitizerError::SegmentTooLong(raw.to_string()));
        }

        let cleaned: String = trimmed
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // Segments never start with a dot.
        let cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.is_empty() {
            return Err(PathSanitizerError::InvalidSegment(raw.to_string()));
        }

        Ok(cleaned)
    }

    /// Join sanitized segments under `root` and check the result stays
    /// inside it.
    pub fn join_under(&self, root: &Path, segments: &[&str]) -> Result<PathBuf, PathSanitizerError> {
        let mut path = root.to_path_buf();
        for raw in segments {
            path.push(self.segment(raw)?);
        }

        let escapes = path
            .strip_prefix(root)
            .map(|rel| rel.components().any(|c| !matches!(c, Component::Normal(_))))
            .unwrap_or(true);
        if escapes {
            tracing::warn!(path = %path.display(), root = %root.display(), "Path outside root boundary detected");
            return Err(PathSanitizerError::OutsideBoundary(path.display().to_string()));
        }

        Ok(path)
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_segment() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(sanitizer.segment("swarm-1").unwrap(), "swarm-1");
        assert_eq!(sanitizer.segment("  run_2024.01  ").unwrap(), "run_2024.01");
    }

    #[test]
    fn test_separators_are_replaced() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(sanitizer.segment("a/b\\c").unwrap(), "a_b_c");
        assert_eq!(sanitizer.segment("../../etc").unwrap(), "_.._etc");
    }

    #[test]
    fn test_reject_parent_dir() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.segment("..");
        assert!(matches!(result.unwrap_err(), PathSanitizerError::PathTraversal(_)));
    }

    #[test]
    fn test_reject_empty_and_null() {
        let sanitizer = PathSanitizer::new();
        assert!(matches!(sanitizer.segment("  "), Err(PathSanitizerError::InvalidSegment(_))));
        assert!(matches!(sanitizer.segment("a\0b"), Err(PathSanitizerError::InvalidSegment(_))));
    }

    #[test]
    fn test_leading_dots_are_stripped() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(sanitizer.segment(".hidden").unwrap(), "hidden");
        assert!(sanitizer.segment("...").is_err());
    }

    #[test]
    fn test_segment_too_long() {
        let sanitizer = PathSanitizer::with_max_length(4);
        assert!(matches!(
            sanitizer.segment("abcdefgh"),
            Err(PathSanitizerError::SegmentTooLong(_))
        ));
    }

    #[test]
    fn test_join_under_root() {
        let sanitizer = PathSanitizer::new();
        let root = Path::new("/var/lib/aegis/journal");
        let path = sanitizer.join_under(root, &["sw/1", "run-1"]).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/aegis/journal/sw_1/run-1"));
        assert!(path.starts_with(root));
    }

    #[test]
    fn test_join_under_rejects_traversal() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.join_under(Path::new("/journal"), &["sw1", ".."]);
        assert!(result.is_err());
    }
}

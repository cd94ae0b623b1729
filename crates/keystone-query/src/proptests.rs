//! Property-based tests for pagination.

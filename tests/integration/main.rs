//! Integration tests against the public library API and a real SQLite
//! database.

mod concurrency;
mod support;

//! Integration tests for the solver crates live under `integration/`.

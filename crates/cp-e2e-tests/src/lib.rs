//! End-to-end tests for the Cargoplane session stack.
//!
//! Everything lives under `tests/`; sessions run against the mock transport
//! from `cp_session::mock` with a hand-driven wall clock.

//! Entry point for `tests/integration/*.rs`: cargo only auto-discovers `tests/*.rs` and
//! `tests/*/main.rs`, so the scenario files under `tests/integration/` need this sibling module
//! (same name as the directory) to actually be compiled and run.

mod buffer_window;
mod mark_and_sweep;

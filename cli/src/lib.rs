//! bpack CLI - builder image tooling.

pub mod commands;

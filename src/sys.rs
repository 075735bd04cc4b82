//! Interfaces to the world outside the tree: the X server, EWMH root
//! properties, and child processes.

pub mod ewmh;
pub mod spawn;
pub mod x11;

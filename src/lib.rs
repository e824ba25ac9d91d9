pub mod auth;
pub mod cli;
pub mod config;
pub mod events;
pub mod logging;
pub mod mapping;
pub mod source;
pub mod sync;
pub mod target;

#[cfg(test)]
mod testing;

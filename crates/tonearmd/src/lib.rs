pub mod cli;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_support;

pub mod client;
pub mod manager;
pub mod pool;
pub mod retry;
pub mod session;
pub mod slot;

#[cfg(test)]
pub(crate) mod fake;

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod preferences;
pub mod process;
pub mod reconciler;
pub mod router;
pub mod server_id;
pub mod supervisor;
pub mod terminal;
pub mod tracker;

#[cfg(test)]
mod tests;

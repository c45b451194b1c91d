// ABOUTME: Command module aggregator for the shipit CLI.
// ABOUTME: Re-exports deploy, check, status and logs command handlers.

mod check;
mod deploy;
mod logs;
mod runtime_connection;
mod status;

pub use check::check;
pub use deploy::deploy;
pub use logs::logs;
pub use status::status;

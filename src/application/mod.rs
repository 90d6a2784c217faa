// Application layer: use cases over the account and ledger stores.
// Clients (the CLI, tests) hold a `Session` and call `AccountService`.

pub mod credentials;
pub mod error;
mod service;
mod session;

pub use error::*;
pub use service::*;
pub use session::*;

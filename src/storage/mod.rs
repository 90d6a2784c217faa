mod account_store;
pub mod codec;
mod config;
mod error;
mod ledger_store;
mod lock;

use std::path::{Path, PathBuf};

pub use account_store::*;
pub use config::*;
pub use error::*;
pub use ledger_store::*;
pub use lock::*;

/// `data_path` with `suffix` appended to its file name.
pub(crate) fn sibling_path(data_path: &Path, suffix: &str) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

mod account;
mod entry;
mod integrity;
mod money;

pub use account::*;
pub use entry::*;
pub use integrity::*;
pub use money::*;

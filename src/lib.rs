pub mod cli;
pub mod config;
pub mod error;
pub mod isbn;
pub mod remote;
pub mod source;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use remote::{HardcoverClient, RemoteJournal};
pub use source::KoboSource;
pub use store::MirrorStore;
pub use sync::Reconciler;

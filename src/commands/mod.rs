//! Subcommand implementations. Each prints its own progress and result.

mod install;
mod list;
mod locate;
mod packages;
mod switch;

pub use install::install;
pub use list::{InstalledPackage, installed, list};
pub use locate::locate;
pub use packages::packages;
pub use switch::switch;

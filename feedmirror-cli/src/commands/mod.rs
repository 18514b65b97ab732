pub mod feeds;
pub mod resync;
pub mod sync;
pub mod validate;

pub use crate::utils::tui::create_spinner;

pub mod path;
pub mod process;

pub use path::{sanitize_filename, BangumiPathExt};
pub use process::locate_executable;

mod commands;
mod paths;
mod platform;

pub use commands::DetachCommand;
pub use paths::{AppPaths, AppPathsError};
pub use platform::Platform;

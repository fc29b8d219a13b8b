pub mod serve;
pub mod setup;

pub use serve::ServeCommand;
pub use setup::SetupCommand;

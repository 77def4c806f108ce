// Library module
// Finds audio files and maps track ids onto them

pub mod resources;
pub mod scanner;

pub use resources::{RawResources, ResourceError, ResourceResolver, TrackId};
pub use scanner::DirectoryScanner;

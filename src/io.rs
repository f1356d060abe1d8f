pub mod crypto;
pub mod ffmpeg;
pub mod paths;
pub mod process;
pub mod progress;

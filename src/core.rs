pub mod audio;
pub mod engine;
pub mod invoker;
pub mod packager;
pub mod splitter;

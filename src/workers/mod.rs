pub mod reaper;
pub mod transcoder;

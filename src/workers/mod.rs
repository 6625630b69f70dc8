pub mod sweeper;
pub mod transcoder;

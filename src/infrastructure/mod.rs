pub mod archive;
pub mod encoder;
pub mod mail;
pub mod storage;

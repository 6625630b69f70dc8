pub mod local;
pub mod locks;

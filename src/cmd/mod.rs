pub mod cleanup;
pub mod login;
pub mod progress;
pub mod tenant;

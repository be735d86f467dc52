pub mod check;
pub mod compare;
pub mod download;
pub mod install;
pub mod watch;

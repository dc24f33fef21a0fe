pub mod daemon;
pub mod tail;
pub mod watch;

//! Domain types shared by the session, the compile pipeline and the hosts.

pub mod config;
pub mod project;

pub mod client;
pub mod communities;
pub mod connect;
pub mod entities;
pub mod members;
pub mod proposals;
pub mod transfers;

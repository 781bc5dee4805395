#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod client;

#[macro_use]
extern crate log;

#[macro_use]
extern crate bitflags;

extern crate libc;

mod sys;

pub mod poll;

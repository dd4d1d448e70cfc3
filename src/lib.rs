extern crate chrono;
extern crate nalgebra;
extern crate ndarray;
extern crate ordered_float;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

#[cfg(feature = "serde")]
extern crate serde;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_derive;

pub mod decode;
pub mod graph;
pub mod logging;

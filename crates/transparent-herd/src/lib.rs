#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod batched;
mod config;
mod controller;
mod deferred;
mod error;
mod queue;
mod stats;
mod worker;

pub use crate::batched::*;
pub use crate::config::*;
pub use crate::controller::{Herd, HerdBuilder};
pub use crate::deferred::*;
pub use crate::error::*;
pub use crate::stats::StatsSnapshot;
pub use crate::worker::WorkerId;

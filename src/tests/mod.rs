//! Test modules

mod batch_tests;
mod middleware_tests;

mod support;

pub(crate) use support::*;

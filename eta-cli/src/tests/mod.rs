//! Shared test harness modules for the `eta` CLI.

use super::*;

mod estimate_unit;
mod helpers;

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outgoing mapping dispatch: mode transforms, boundary actions, and the
//! per-device router that evaluates a signal update against every
//! mapping sourced from it.

mod bound;
mod dispatch;
mod mode;

pub use bound::BoundAction;
pub use dispatch::{dispatch, OutgoingSample};
pub use mode::Mode;

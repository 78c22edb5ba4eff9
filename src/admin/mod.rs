// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The admin bus: multicast discovery, collision-resolved naming,
//! periodic announcement, link/mapping negotiation, and subscription
//! leases.

mod announce;
mod bus;
mod link;
mod mapping;
mod naming;
mod subscribe;
mod timers;

pub use bus::AdminBus;
pub use naming::NamingState;

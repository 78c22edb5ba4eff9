// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed property-key schema and message codec.
//!
//! Every wire message is a path followed by a flat `@key value...` argument
//! stream. [`keys`] defines the closed key enumeration and its wire
//! spellings; [`value`] defines the typed argument model; [`table`] is the
//! ordered extras bag used both standalone (property tables on any entity)
//! and embedded in a parsed [`Message`]; [`message`] implements the
//! parse/build algorithm itself.

mod keys;
mod message;
mod table;
mod value;

pub use keys::{Key, ALL};
pub use message::{Message, MessageBuilder};
pub use table::PropertyTable;
pub use value::{homogeneous_type, Value, ValueType};

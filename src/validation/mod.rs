//! Event validation
//!
//! Checks the identifying fields an event must carry before it is published or
//! folded into the aggregate.

mod event;

pub use event::{validate_event, ValidationError, REQUIRED_FIELDS};

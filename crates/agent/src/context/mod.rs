//! Context window management.
//!
//! | Slot | Source | Evicted |
//! |------|--------|---------|
//! | System persona | Persona file | Never |
//! | User persona | Persona file | Never |
//! | History | Turn history, then committed turns | Oldest first, into one summary |
//! | Memory stream | Memory store rendering | Rebuilt per request |
//! | Entity store | Entity store rendering | Rebuilt per request |

pub mod token;
pub mod window;

pub use window::{ContextWindow, Eviction, WindowSettings};

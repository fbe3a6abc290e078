// Lockdown state machines - channel lockdown, invite pause and silence.
//
// Lockdown and invite pause are permission overlays on channels, silence is a
// role on members. The three are independent of each other.

pub mod lockdown_service;
pub mod silence_service;
pub mod snapshot;

pub use lockdown_service::*;
pub use silence_service::*;
pub use snapshot::*;

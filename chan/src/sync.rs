//! Blocking queue and the wait policies its operations take.

pub mod queue;
pub mod timeout;

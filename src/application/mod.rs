//! # Application Layer
//!
//! The dispatch logic: the dispatcher loop and what it drives.
//! This includes the recipient queue, the rate and business-hours gates, message composition,
//! progress checkpoints and status logging.

pub mod business_hours;
pub mod composer;
pub mod dispatcher;
pub mod logging;
pub mod queue;
pub mod rate_gate;
pub mod state;
pub mod utils;

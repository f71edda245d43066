pub mod monitor;
pub mod readiness;
pub mod tcp;

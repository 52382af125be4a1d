pub mod configs;
pub mod health;
pub mod history;
pub mod liveness;
pub mod readiness;
pub mod runs;
pub mod status;

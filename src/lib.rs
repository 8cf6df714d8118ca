pub mod config;
pub mod core;
pub mod error;
pub mod scheduler;
pub mod sim;

pub use config::SchedConfig;
pub use error::{SchedError, SchedResult};
pub use scheduler::{DomainInfo, GsnEdfM, GsnEdfMBuilder, SchedPlugin};
pub use sim::{JobRecord, Sim, TaskSpec};

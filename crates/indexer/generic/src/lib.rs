pub mod pipeline;
pub mod signal;
pub mod state;
pub mod supervisor;

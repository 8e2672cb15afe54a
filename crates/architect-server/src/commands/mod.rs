pub mod generations;
pub mod pending;
pub mod serve;
pub mod sync;

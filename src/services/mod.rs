pub mod devices;
pub mod enumerator;
pub mod executor;
pub mod queue;
pub mod result_sink;
pub mod scanner;
pub mod verification;

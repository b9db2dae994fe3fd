// Tick collection and order execution
pub mod gateway;
pub mod tick_buffer;

pub use gateway::{Execution, ExecutionGateway};
pub use tick_buffer::TickBuffer;

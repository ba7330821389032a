pub mod decode;
pub mod engine;
pub mod poller;
pub mod pool;

pub use engine::{Engine, EngineConf};
pub use pool::PortPool;

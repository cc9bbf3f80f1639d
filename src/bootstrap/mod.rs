mod events;
mod scheduler;
mod server;
mod shutdown;

pub use events::{Event, EventBus, EventObserver, LoggingObserver};
pub use scheduler::Scheduler;
pub use server::Server;
pub use shutdown::{stopping, Shutdown, ShutdownState};

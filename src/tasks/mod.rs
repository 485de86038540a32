mod probe;
mod scheduler;

pub use probe::ConnectivityProbe;
pub use scheduler::DeliveryScheduler;

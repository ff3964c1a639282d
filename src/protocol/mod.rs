pub mod channel;
pub mod communicator;
pub mod demand_signal;
pub mod message_header;

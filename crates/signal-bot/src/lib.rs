pub mod messages;
pub mod responder;
pub mod scheduler;
pub mod selector;
pub mod telegram;
pub mod transport;
pub mod updates;

#[cfg(test)]
mod testing;

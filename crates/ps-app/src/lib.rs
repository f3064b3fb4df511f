pub mod checkout;
pub mod configurator;
pub mod error;
pub mod events;
pub mod generator;
pub mod poller;
pub mod state;

#[cfg(test)]
mod testing;

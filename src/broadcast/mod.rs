// file: src/broadcast/mod.rs
// description: progress fan-out and the distributed broker behind it

pub mod broker;
pub mod bus;

pub use broker::{
    Broker, BrokerSelection, BrokerStatus, MessageHandler, NullBroker, RedisBroker, RelayHealth,
    select_broker,
};
pub use bus::{ProgressBus, Subscription};

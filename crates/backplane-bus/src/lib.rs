//! Job Bus (C3) and Publisher (C4): durable per-pipeline work-queue
//! streams, an ephemeral progress pub/sub hierarchy, a worker-status KV
//! bucket, and typed job producers. See `streams` for the stream/subject
//! catalogue and `nats` for the `async-nats` JetStream backing.

pub mod bus;
pub mod error;
pub mod nats;
pub mod publisher;
pub mod streams;
pub mod testing;

pub use bus::{Ackable, Delivery, JobBus, JobBusConfig, ProgressSubscription, PublishAck, QueueInfo};
pub use error::{BusError, BusResult, PublishError, PublishResult};
pub use nats::NatsJobBus;
pub use publisher::Publisher;
pub use streams::Pipeline;

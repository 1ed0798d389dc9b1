//! Broker and store I/O: the Kafka source, the MongoDB sink, and the metrics endpoint
//! they both report through.

pub mod metrics;
pub mod sink_mongo;
pub mod source_kafka;

pub use sink_mongo::MongoSink;
pub use source_kafka::{CommitHandle, KafkaSource};

// Queueherd Infrastructure - Redis Adapter
// Implements: QueueDepthProbe

pub mod redis_probe;

pub use redis_probe::RedisQueueProbe;

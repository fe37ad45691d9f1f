pub mod consumer;
pub mod key_strategy;
pub mod message;
pub mod producer;
pub mod serializer;
pub mod topic_manager;


pub use key_strategy::KeyStrategy;
pub use message::{BrokerClient, PendingMessage};
pub use producer::KafkaProducer;
pub use serializer::{MessageFormat, MessageShaper};
pub use topic_manager::TopicManager;

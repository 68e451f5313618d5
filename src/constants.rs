/// Public DNS suffix of the Event Hubs service.
pub const DEFAULT_DOMAIN: &str = "servicebus.windows.net";
pub const DEFAULT_PORT: u16 = 5671;
pub const DEFAULT_RECEIVE_CREDITS: u32 = 999;
pub const DEFAULT_CONSUMER_GROUP: &str = "$default";
pub const DEFAULT_THREAD_WAIT_SEC: u64 = 5;

/// Maximum number of messages requested from a receiver per poll.
pub const RECEIVE_BATCH_SIZE: usize = 10;

/// Number of body characters included in per-message debug logs.
pub const LOG_BODY_PREVIEW_CHARS: usize = 50;

pub const TAGS_FIELD: &str = "tags";
pub const MESSAGE_FIELD: &str = "message";

pub const USER_AGENT: &str = concat!("eventhub-partition-consumer/", env!("CARGO_PKG_VERSION"));

/// SASL user name the Event Hubs Kafka endpoint expects when authenticating
/// with a connection string.
pub const KAFKA_CONNECTION_STRING_USER: &str = "$ConnectionString";

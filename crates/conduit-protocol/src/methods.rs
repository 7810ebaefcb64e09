//! JSON-RPC method name constants for the MCP surface this runtime
//! implements. Centralized so server dispatch and client call sites never
//! duplicate the literal strings.

pub const INITIALIZE: &str = "initialize";
pub const PING: &str = "ping";

pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";

pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";

pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Notifications, client → server.
pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
pub const NOTIFICATIONS_CANCELLED: &str = "notifications/cancelled";

/// Notifications, server → client.
pub const NOTIFICATIONS_MESSAGE: &str = "notifications/message";
pub const NOTIFICATIONS_RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const NOTIFICATIONS_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const NOTIFICATIONS_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const NOTIFICATIONS_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

/// Methods that are valid before a session reaches `ready`. Every other
/// method arriving pre-initialization is rejected with `-32002`, including
/// `ping`: per the method-surface table, `ping` itself requires `ready`.
pub const PRE_INIT_ALLOWED: &[&str] = &[INITIALIZE];

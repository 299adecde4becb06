/// mDNS service type shared by every backend and the broker
pub const SERVICE_TYPE: &str = "_my-cool-app._tcp.local.";

/// Broker HTTP port
pub const BROKER_PORT: u16 = 1337;

/// Backend HTTP port when `BACKEND_PORT` is unset
pub const DEFAULT_BACKEND_PORT: u16 = 8080;

/// Environment variable overriding the backend port
pub const BACKEND_PORT_ENV: &str = "BACKEND_PORT";

/// Prefix of proxied requests: `/proxy/<service>/<rest>`
pub const PROXY_PREFIX: &str = "/proxy";

/// Listing of discovered backends
pub const DEVICES_PATH: &str = "/devices";

/// The single API call a backend answers
pub const HELLO_WORLD_PATH: &str = "/api/v1/hello-world";

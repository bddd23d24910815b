pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the default terminal logger. Components take an optional parent `Logger` on
/// construction and fall back to a discarding root when none is supplied.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Error parsing logger config");

    config.build_logger().expect("Error building logger")
}

/// Error code registry for siphon
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 8000-8999: Stream errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_OUTPUT_ERROR: u16 = 4008;
    pub const EXEC_WAIT_FAILED: u16 = 4011;

    // Stream errors (8000-8999)
    pub const STREAM_GENERIC: u16 = 8000;
    pub const STREAM_NOT_CONNECTED: u16 = 8001;
    pub const STREAM_DECODE_FAILED: u16 = 8002;
    pub const STREAM_READ_FAILED: u16 = 8003;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Failed to parse configuration",
        1003 => "Invalid value in configuration",

        // Execution errors
        4000 => "Generic execution error",
        4001 => "Command not found",
        4003 => "Subprocess failed",
        4007 => "Failed to spawn subprocess",
        4008 => "Command output error",
        4011 => "Failed to wait for subprocess exit",

        // Stream errors
        8000 => "Generic stream error",
        8001 => "Process stream is not connected",
        8002 => "Trailing output could not be decoded",
        8003 => "Failed to read process output",

        // Other errors
        9000 => "Generic error",

        _ => "Unknown error code",
    }
}

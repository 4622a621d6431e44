use std::time::Duration;

/// Literal prefix of an mbox boundary line
pub const BOUNDARY_PREFIX: &[u8] = b"From ";

/// Suffix of in-flight message files (`<uuid>.tmp.eml`)
pub const TEMP_SUFFIX: &str = ".tmp.eml";

/// Appended to the output directory of an archive found inside the output tree
pub const ARCHIVE_DIR_SUFFIX: &str = ".d";

/// Upper bound on header bytes buffered per message for identity resolution
pub const MAX_HEADER_BYTES: usize = 256 * 1024;

/// Longest identity used as a file name stem; leaves room for `.eml`/`.txt`
/// under the common 255-byte file name limit
pub const MAX_IDENTITY_BYTES: usize = 200;

/// Read buffer for archive input
pub const ARCHIVE_BUFFER_SIZE: usize = 128 * 1024;

/// Extension of inputs that never get a job
pub const SKIPPED_EXTENSION: &str = "txt";

/// Minimum gap between two stats snapshots
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Default `-j` passed to readpst
pub const DEFAULT_READPST_JOBS: u32 = 3;

/// Job output protocol version understood by this build
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the protocol version to workers
pub const PROTOCOL_ENV: &str = "MAILSIFT_PROTOCOL";

/// Progress symbols
pub const SYMBOL_EML: char = ',';
pub const SYMBOL_TEXT: char = '.';
pub const SYMBOL_ATTACHMENT: char = '+';
pub const SYMBOL_UNKNOWN_TYPE: char = '?';
pub const SYMBOL_MAILBOX: char = '#';

/// External PST to mbox converter
pub const READPST_BIN: &str = "readpst";

//! Common constants used throughout skelgen.

/// Token returned by `writeBytes` and later replaced by the queued raw bytes.
/// It only ever lives inside already-rendered buffers.
pub const BYTES_MARKER: &str = "\u{1}\u{2}<skelgen:raw-bytes>\u{2}\u{1}";

/// Directory name used for generated output when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = "out";

/// Shell invocation used when the document declares none for this platform.
#[cfg(windows)]
pub const DEFAULT_SHELL: &str = "cmd.exe /c";

/// Shell invocation used when the document declares none for this platform.
#[cfg(not(windows))]
pub const DEFAULT_SHELL: &str = "bash -c";

/// Platform key looked up in a mapping-form `shell` declaration.
#[cfg(windows)]
pub const SHELL_PLATFORM: &str = "windows";

/// Platform key looked up in a mapping-form `shell` declaration.
#[cfg(not(windows))]
pub const SHELL_PLATFORM: &str = "unix";

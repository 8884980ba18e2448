//! Logging setup and the diagnostic output sink.
//!
//! `log` carries developer diagnostics; a [`LogSink`] receives the per-step
//! report of a generation run (`[block] -> message` lines). Generation never
//! depends on either for correctness.

use std::io::Write;

pub fn init_logger(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();
}

/// Receives `(block name, message)` pairs at every meaningful step of a run.
pub trait LogSink {
    fn log(&mut self, block: &str, message: &str);
}

/// Writes `[block] -> message` lines to any writer, stdout by default.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl Default for WriterSink<std::io::Stdout> {
    fn default() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> LogSink for WriterSink<W> {
    fn log(&mut self, block: &str, message: &str) {
        log::debug!("[{block}] {message}");
        // Diagnostics are best effort.
        let _ = writeln!(self.writer, "[{block}] -> {}", message.trim_end_matches('\n'));
        let _ = self.writer.flush();
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&mut self, block: &str, message: &str) {
        log::trace!("[{block}] {message}");
    }
}

/// Keeps every entry in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub entries: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages logged under `block`, in order.
    pub fn messages(&self, block: &str) -> Vec<&str> {
        self.entries.iter().filter(|(b, _)| b == block).map(|(_, m)| m.as_str()).collect()
    }
}

impl LogSink for MemorySink {
    fn log(&mut self, block: &str, message: &str) {
        self.entries.push((block.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_format() {
        let mut buf = Vec::new();
        {
            let mut sink = WriterSink::new(&mut buf);
            sink.log("vars", "${name}: demo\n");
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "[vars] -> ${name}: demo\n");
    }

    #[test]
    fn test_memory_sink_filters_by_block() {
        let mut sink = MemorySink::new();
        sink.log("envs", "a");
        sink.log("vars", "b");
        sink.log("envs", "c");
        assert_eq!(sink.messages("envs"), vec!["a", "c"]);
    }
}

//! `print`/`println` side-effect sink.
//!
//! A trait the VM is generic over, plus a default implementation that writes
//! to real stdout and a couple of test-oriented ones.

pub trait PrintSink {
    /// Writes text with no added separator or newline. `print`/`println`
    /// differ only in whether a trailing `\n` follows.
    fn write(&mut self, text: &str);

    fn write_line(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }
}

/// Default sink: writes straight to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintSink for StdPrint {
    fn write(&mut self, text: &str) {
        use std::io::Write as _;
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

/// Discards all output. Useful when only side effects other than stdout
/// (e.g. diagnostics) are under test.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintSink for NoPrint {
    fn write(&mut self, _text: &str) {}
}

/// Buffers output in memory for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectPrint {
    pub buffer: String,
}

impl PrintSink for CollectPrint {
    fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

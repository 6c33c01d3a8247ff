use std::{
    cell::RefCell,
    io::{self, BufRead, Write},
    rc::Rc,
};

/// The three host streams owned by a VM.
pub(crate) struct Streams {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
    error: Box<dyn Write>,
}

impl Streams {
    pub fn new(input: impl BufRead + 'static, output: impl Write + 'static, error: impl Write + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            error: Box::new(error),
        }
    }

    pub fn write_out(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())
    }

    pub fn flush_out(&mut self) -> io::Result<()> {
        self.output.flush()
    }

    pub fn write_err(&mut self, text: &str) -> io::Result<()> {
        self.error.write_all(text.as_bytes())?;
        self.error.flush()
    }

    /// Reads one line without its terminator, or `None` at end of input.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// A `Write` sink that collects everything written into a shared buffer.
///
/// Clones share the buffer, so one clone can be handed to a VM while the other is read
/// back afterwards. Useful for tests and for hosts that capture script output.
#[derive(Debug, Clone, Default)]
pub struct CollectOutput(Rc<RefCell<Vec<u8>>>);

impl CollectOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for CollectOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_output_is_shared() {
        let out = CollectOutput::new();
        let mut writer = out.clone();
        write!(writer, "hello").unwrap();
        assert_eq!(out.contents(), "hello");
        out.clear();
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn read_line_strips_terminator() {
        let mut streams = Streams::new(&b"one\r\ntwo"[..], io::sink(), io::sink());
        assert_eq!(streams.read_line().unwrap().as_deref(), Some("one"));
        assert_eq!(streams.read_line().unwrap().as_deref(), Some("two"));
        assert_eq!(streams.read_line().unwrap(), None);
    }
}

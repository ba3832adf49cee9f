/// Reassemble a byte stream into lines.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append `data` and return all lines completed by it, without the line terminator.
    /// A carriage return before the newline is dropped as well.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(data);

        let mut lines = vec![];
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let line = self.buf[start..end]
                .strip_suffix(b"\r")
                .unwrap_or(&self.buf[start..end]);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Return the incomplete last line, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Number of buffered bytes of the incomplete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"12^do").is_empty());
        assert_eq!(buf.pending(), 5);
        assert_eq!(buf.push(b"ne\r\n(gdb) \n~\"a"), vec!["12^done", "(gdb) "]);
        assert_eq!(buf.push(b"\"\n\n"), vec!["~\"a\"", ""]);
        assert_eq!(buf.pending(), 0);
        assert_eq!(buf.flush(), None);

        buf.push(b"tail");
        assert_eq!(buf.flush(), Some("tail".to_string()));
        assert_eq!(buf.pending(), 0);
    }
}

use tracing_subscriber::fmt::MakeWriter;

/// A writer that redacts provider credentials from log output.
pub struct RedactingWriter<W> {
    inner: W,
}

impl RedactingWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            inner: std::io::stderr(),
        }
    }
}

impl<W: std::io::Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        let redacted = redact_secrets(&original);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<std::io::Stderr> {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: std::io::stderr(),
        }
    }
}

/// Replace known API key patterns with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    // Google keys, OpenAI-style keys, bearer headers, `key=` query parameters
    static PATTERNS: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r"(?x)
              AIza[0-9A-Za-z_\-]{20,}      # Google API keys
            | sk-[A-Za-z0-9_\-]{20,}       # OpenAI keys (incl. sk-proj-)
            | (?i:bearer)\s+[A-Za-z0-9._\-]{16,}
            | [?&]key=[^&\s]+              # Gemini query credential
            ",
        )
        .expect("redaction regex should compile")
    });

    PATTERNS
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            match matched.chars().next() {
                Some(sep @ ('?' | '&')) => format!("{sep}key=[REDACTED]"),
                _ => "[REDACTED]".to_string(),
            }
        })
        .into_owned()
}

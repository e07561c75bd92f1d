//! Response Line Tokenizer
//!
//! ELM-class adapters reply with carriage-return separated ASCII lines
//! and mark end-of-response with a prompt character. Serial noise shows
//! up as NUL bytes, which are dropped on arrival. The tokenizer is fed
//! raw chunks as they are read and reports when the prompt lands.

/// Incremental tokenizer for one adapter exchange
#[derive(Debug)]
pub struct LineTokenizer {
    prompt: u8,
    buf: Vec<u8>,
    prompt_seen: bool,
}

impl LineTokenizer {
    /// Tokenizer for a dialect ending responses with `prompt`
    pub fn new(prompt: u8) -> Self {
        Self {
            prompt,
            buf: Vec::new(),
            prompt_seen: false,
        }
    }

    /// Feed a chunk of raw bytes; returns true once the prompt has
    /// arrived (it is consumed, not buffered)
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        for &byte in chunk {
            match byte {
                0x00 => {} // line noise
                b if b == self.prompt => self.prompt_seen = true,
                b => self.buf.push(b),
            }
        }
        self.prompt_seen
    }

    /// Whether the prompt has arrived for the current exchange
    pub fn prompt_seen(&self) -> bool {
        self.prompt_seen
    }

    /// Text buffered so far, for error context
    pub fn partial(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    /// Split the buffered exchange into non-empty lines and reset for
    /// the next exchange
    pub fn take_lines(&mut self) -> Vec<String> {
        let lines = self
            .buf
            .split(|&b| b == b'\r')
            .map(|raw| String::from_utf8_lossy(raw).trim_matches(['\n', ' ']).to_string())
            .filter(|line| !line.is_empty())
            .collect();
        self.buf.clear();
        self.prompt_seen = false;
        lines
    }
}

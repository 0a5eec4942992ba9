//! Output comparison
//!
//! Both checks split on runs of C-locale whitespace (space, `\t`, `\n`,
//! `\r`, form feed and vertical tab) and compare the resulting tokens as
//! exact byte strings. Trailing newlines, repeated spaces and line wrapping
//! do not matter; `3` and `03` differ.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::core::Verdict;

/// `Accepted` when both texts have the same token sequence, `WrongAnswer` otherwise
pub fn compare_output(actual: &str, expected: &str) -> Verdict {
    if tokens_match(actual, expected) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

pub fn tokens_match(actual: &str, expected: &str) -> bool {
    tokens(actual).eq(tokens(expected))
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_ascii() && is_separator(c as u8))
        .filter(|token| !token.is_empty())
}

/// `u8::is_ascii_whitespace` plus vertical tab
fn is_separator(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == 0x0b
}

/// Token comparison of two files without loading either fully into memory.
///
/// Fails when either file cannot be opened or read.
pub fn token_equal_files(a: impl AsRef<Path>, b: impl AsRef<Path>) -> io::Result<bool> {
    let mut left = TokenReader::new(BufReader::new(File::open(a)?));
    let mut right = TokenReader::new(BufReader::new(File::open(b)?));
    let mut left_token = Vec::new();
    let mut right_token = Vec::new();

    loop {
        let has_left = left.next_token(&mut left_token)?;
        let has_right = right.next_token(&mut right_token)?;
        match (has_left, has_right) {
            (false, false) => return Ok(true),
            (true, true) if left_token == right_token => continue,
            _ => return Ok(false),
        }
    }
}

struct TokenReader<R> {
    reader: R,
}

impl<R: BufRead> TokenReader<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Fill `token` with the next token; `false` at end of input
    fn next_token(&mut self, token: &mut Vec<u8>) -> io::Result<bool> {
        token.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(!token.is_empty());
            }

            let mut used = 0;
            let mut complete = false;
            for &byte in available {
                used += 1;
                if is_separator(byte) {
                    if !token.is_empty() {
                        complete = true;
                        break;
                    }
                } else {
                    token.push(byte);
                }
            }
            self.reader.consume(used);

            if complete {
                return Ok(true);
            }
        }
    }
}

//! FTP reply parsing.
//!
//! A reply is a three digit code followed by a space, or by `-` when more
//! lines follow. A multi-line reply ends at the first line that starts with
//! the same code and a space; lines in between are free text.

use std::net::Ipv4Addr;

use crate::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub code: u16,
    pub is_last: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx: the action has started, another reply follows.
    #[must_use]
    pub const fn is_preliminary(&self) -> bool {
        self.code >= 100 && self.code < 200
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: more information is needed, e.g. a password after `USER`.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Parses the first line of a reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Parse`] if the line doesn't start with a code.
    pub fn parse_line(line: &str) -> Result<ReplyLine, TransferError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(code_str) = line.get(..3) else {
            return Err(TransferError::Parse(format!(
                "Reply line too short: '{line}'"
            )));
        };

        let code = code_str
            .parse::<u16>()
            .map_err(|_| TransferError::Parse(format!("Invalid reply code: '{code_str}'")))?;

        let is_last = match line[3..].chars().next() {
            None | Some(' ') => true,
            Some('-') => false,
            Some(c) => {
                return Err(TransferError::Parse(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        Ok(ReplyLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Whether `line` closes a multi-line reply opened with `code`.
    #[must_use]
    pub fn terminates(line: &str, code: u16) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);
        let code = code.to_string();
        line.strip_prefix(code.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    }

    /// Extracts the data endpoint from a `227 Entering Passive Mode
    /// (h1,h2,h3,h4,p1,p2)` reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Parse`] if the six numbers are missing or out
    /// of range.
    pub fn passive_endpoint(&self) -> Result<(Ipv4Addr, u16), TransferError> {
        let text = self.message();
        let start = text
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| TransferError::Parse(format!("No address in PASV reply: '{text}'")))?;
        let numbers = text[start..]
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .take(6)
            .map(str::parse::<u8>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| TransferError::Parse(format!("Invalid PASV reply: '{text}'")))?;

        let [h1, h2, h3, h4, p1, p2] = numbers[..] else {
            return Err(TransferError::Parse(format!("Invalid PASV reply: '{text}'")));
        };

        Ok((
            Ipv4Addr::new(h1, h2, h3, h4),
            (u16::from(p1) << 8) | u16::from(p2),
        ))
    }
}

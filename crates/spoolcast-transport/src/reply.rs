// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// FTP control-channel replies (RFC 959 §4.2).
//
// A reply is a three-digit code followed by text. Multi-line replies open with
// `123-` and close with a line starting `123 `. The first digit decides how
// the session reacts:
//   1xx preliminary, 2xx done, 3xx more input needed,
//   4xx transient failure, 5xx permanent failure.

use std::fmt;
use std::net::Ipv4Addr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use spoolcast_core::error::{Result, SpoolcastError};

/// Longest reply line we accept before calling the peer broken.
const MAX_LINE_LEN: usize = 4096;

/// One complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Text of all lines, joined with `\n`, without the code prefix.
    pub text: String,
}

impl Reply {
    /// First digit of the reply code.
    pub fn class(&self) -> u16 {
        self.code / 100
    }

    /// Require a reply of `expected` class, mapping the others onto the
    /// error taxonomy: 4xx transient, 5xx permission, any other valid class
    /// an unexpected reply.
    pub fn expect_class(self, expected: u16) -> Result<Reply> {
        match self.class() {
            c if c == expected => Ok(self),
            4 => Err(SpoolcastError::TransientTransfer(self.to_string())),
            5 => Err(SpoolcastError::Permission {
                code: self.code,
                message: self.text,
            }),
            _ => Err(SpoolcastError::ProtocolReply {
                code: self.code,
                message: self.text,
            }),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

/// Read one reply from the control channel.
///
/// A closed connection is transient (the printer dropped us); anything that
/// does not look like a reply is a protocol error.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let first = read_line(reader).await?;
    let (code, sep, text) = split_line(&first)?;
    if sep == b' ' {
        return Ok(Reply {
            code,
            text: text.to_owned(),
        });
    }

    let mut lines = vec![text.to_owned()];
    let terminator = format!("{code} ");
    loop {
        let line = read_line(reader).await?;
        if let Some(rest) = line.strip_prefix(&terminator) {
            lines.push(rest.to_owned());
            break;
        }
        lines.push(line);
    }
    Ok(Reply {
        code,
        text: lines.join("\n"),
    })
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let n = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(|e| SpoolcastError::TransientTransfer(format!("control channel read: {e}")))?;
    if n == 0 {
        return Err(SpoolcastError::TransientTransfer(
            "control connection closed by server".into(),
        ));
    }
    if raw.len() > MAX_LINE_LEN {
        return Err(SpoolcastError::Protocol(format!(
            "reply line of {} bytes",
            raw.len()
        )));
    }
    let line = String::from_utf8_lossy(&raw);
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn split_line(line: &str) -> Result<(u16, u8, &str)> {
    let bytes = line.as_bytes();
    let well_formed = bytes.len() >= 4
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && (bytes[0] as char).to_digit(10).is_some_and(|d| (1..=5).contains(&d))
        && (bytes[3] == b' ' || bytes[3] == b'-');
    if !well_formed {
        // Some firmware answers a bare code with no text.
        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit) {
            let code = line.parse().map_err(|_| malformed(line))?;
            return Ok((code, b' ', ""));
        }
        return Err(malformed(line));
    }
    let code = line[..3].parse().map_err(|_| malformed(line))?;
    Ok((code, bytes[3], &line[4..]))
}

fn malformed(line: &str) -> SpoolcastError {
    SpoolcastError::Protocol(format!("malformed reply: {line:?}"))
}

/// Parse the address out of a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
/// reply.
pub fn parse_pasv(reply: &Reply) -> Result<(Ipv4Addr, u16)> {
    if reply.code != 227 {
        return Err(SpoolcastError::ProtocolReply {
            code: reply.code,
            message: reply.text.clone(),
        });
    }

    // Servers disagree on the parentheses, so take the first run of six
    // comma-separated numbers anywhere in the text.
    let numbers = reply
        .text
        .split(|c: char| !(c.is_ascii_digit() || c == ','))
        .find_map(|run| {
            let parts: Vec<&str> = run.split(',').collect();
            if parts.len() != 6 {
                return None;
            }
            let parsed: Option<Vec<u8>> = parts.iter().map(|p| p.parse().ok()).collect();
            parsed
        })
        .ok_or_else(|| {
            SpoolcastError::Protocol(format!("unparsable passive reply: {reply}"))
        })?;

    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = (u16::from(numbers[4]) << 8) | u16::from(numbers[5]);
    Ok((ip, port))
}

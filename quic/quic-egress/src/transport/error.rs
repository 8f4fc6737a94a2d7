// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# QUIC transport error codes and application error codes share a
//# common space

/// The error a connection is closing with.
///
/// Cached on the outbound queue once a CONNECTION_CLOSE goes on the
/// wire, so retransmitted close frames carry the same code, triggering
/// frame type and reason phrase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Error {
    /// Error code; transport or application space depending on the
    /// close frame carrying it
    pub code: u64,
    /// The frame type that triggered the error, when known
    pub frame_type: u64,
    /// Optional human-readable reason phrase
    pub reason: Bytes,
}

impl Error {
    pub const NO_ERROR: u64 = 0x0;
    pub const APPLICATION_ERROR: u64 = 0xc;

    pub fn new(code: u64) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn with_frame_type(mut self, frame_type: u64) -> Self {
        self.frame_type = frame_type;
        self
    }

    pub fn with_reason(mut self, reason: Bytes) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "transport error {:#x}", self.code)?;
        if self.frame_type != 0 {
            write!(f, " (frame type {:#x})", self.frame_type)?;
        }
        if let Ok(reason) = core::str::from_utf8(&self.reason) {
            if !reason.is_empty() {
                write!(f, ": {reason}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let error = Error::new(0x7)
            .with_frame_type(0x1c)
            .with_reason(Bytes::from_static(b"kicked"));
        assert_eq!(error.to_string(), "transport error 0x7 (frame type 0x1c): kicked");

        assert_eq!(Error::new(0x7).to_string(), "transport error 0x7");
    }
}

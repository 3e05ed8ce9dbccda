use bytes::Bytes;

use super::types::CLOSE_ABNORMAL;

/// Close code for a close frame that carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Transport-neutral websocket frame.
///
/// Transports convert their native message type into/from `WsFrame`; the session runtime only
/// ever sees this enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsFrame {
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(Bytes::from(s.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from(reason.into()),
        }))
    }

    /// Text payload, if this is a text frame holding valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsFrame::Text(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

impl WsCloseFrame {
    pub fn reason_text(&self) -> String {
        String::from_utf8_lossy(&self.reason).into_owned()
    }
}

/// Close code and reason text reported for an optional close frame.
pub fn close_parts(frame: Option<&WsCloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (frame.code, frame.reason_text()),
        None => (CLOSE_NO_STATUS, String::new()),
    }
}

/// Close code and reason for a stream that ended or failed without a close frame.
pub fn abnormal_close(reason: impl Into<String>) -> (u16, String) {
    (CLOSE_ABNORMAL, reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_expose_their_payload() {
        let frame = WsFrame::text(r#"{"type":"PONG"}"#);
        assert_eq!(frame.as_text(), Some(r#"{"type":"PONG"}"#));
        assert_eq!(WsFrame::Binary(Bytes::from_static(b"\x00")).as_text(), None);
    }

    #[test]
    fn missing_close_frame_reports_no_status() {
        assert_eq!(close_parts(None), (1005, String::new()));
        let frame = WsCloseFrame {
            code: 4001,
            reason: Bytes::from_static(b"kicked"),
        };
        assert_eq!(close_parts(Some(&frame)), (4001, "kicked".to_string()));
    }
}

//! Wire rules
//!
//! There is no framing: the bytes returned by one read are one message.
//! A message equal to `exit` is a disconnect directive; everything else is
//! relayed as `label + ": " + payload`.

/// The exact bytes a client sends to leave
pub const EXIT_DIRECTIVE: &[u8] = b"exit";

/// Label used when the receiving connection is the sender itself
pub const SELF_LABEL: &str = "me";

/// Client → Server message, as interpreted by a connection handler
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Disconnect directive (never broadcast)
    Exit,
    /// Anything else, relayed verbatim
    Chat(&'a [u8]),
}

impl<'a> Inbound<'a> {
    /// Classify the bytes of one read
    pub fn parse(bytes: &'a [u8]) -> Self {
        if bytes == EXIT_DIRECTIVE {
            Inbound::Exit
        } else {
            Inbound::Chat(bytes)
        }
    }
}

/// Who a broadcast is attributed to, from the target's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderLabel<'a> {
    /// The target is the sender
    Me,
    /// The sender's remote address
    Peer(&'a str),
}

impl SenderLabel<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            SenderLabel::Me => SELF_LABEL,
            SenderLabel::Peer(addr) => addr,
        }
    }
}

/// Build the outbound bytes `label + ": " + payload`
pub fn frame_broadcast(label: SenderLabel<'_>, payload: &[u8]) -> Vec<u8> {
    let label = label.as_str();
    let mut frame = Vec::with_capacity(label.len() + 2 + payload.len());
    frame.extend_from_slice(label.as_bytes());
    frame.extend_from_slice(b": ");
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_is_exact_match() {
        assert_eq!(Inbound::parse(b"exit"), Inbound::Exit);
        assert_eq!(Inbound::parse(b"exit\n"), Inbound::Chat(b"exit\n"));
        assert_eq!(Inbound::parse(b"EXIT"), Inbound::Chat(b"EXIT"));
        assert_eq!(Inbound::parse(b" exit"), Inbound::Chat(b" exit"));
    }

    #[test]
    fn test_frame_for_self() {
        assert_eq!(frame_broadcast(SenderLabel::Me, b"hello"), b"me: hello");
    }

    #[test]
    fn test_frame_for_peer() {
        let frame = frame_broadcast(SenderLabel::Peer("127.0.0.1:5555"), b"hi");
        assert_eq!(frame, b"127.0.0.1:5555: hi");
    }

    #[test]
    fn test_frame_keeps_binary_payload() {
        let frame = frame_broadcast(SenderLabel::Me, &[0, 159, 146, 150]);
        assert_eq!(&frame[..4], b"me: ");
        assert_eq!(&frame[4..], &[0, 159, 146, 150]);
    }
}

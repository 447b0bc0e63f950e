use std::time::Duration;

/// Consecutive timeouts either side tolerates before giving up on a session.
pub const TIMEOUT_MAX: u32 = 10;

/// How long the receiver waits for a FILENAME_RESP before resending the FILENAME request.
pub const FILENAME_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the sender waits for an RR/SREJ/EOF_ACK before retransmitting the oldest
/// outstanding packet.
pub const SENDER_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the receiver blocks waiting for the next data packet before concluding the
/// sender has gone away.
pub const RECEIVER_DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the receiver lingers after processing EOF, re-sending EOF_ACK if the sender
/// retransmits EOF (meaning the first EOF_ACK was lost), before exiting regardless.
pub const LAST_DATA_LINGER: Duration = Duration::from_secs(1);

/// Largest datagram either side will ever need to receive: header plus the largest payload.
pub const MAX_DATAGRAM: usize = packet::HEADER_LEN + packet::PAYLOAD_MAX;

//! The file-holding side of the protocol: listens for FILENAME requests, then drives one
//! transfer at a time to completion over a fresh per-client socket.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use packet::{self, Flag};
use runtime::Channel;
use utils::error::Result;
use window::WindowBuffer;

use crate::constants::{MAX_DATAGRAM, SENDER_ACK_TIMEOUT, TIMEOUT_MAX};
use crate::file_io::FileReader;
use crate::seq::Sequence;

/// Serve sessions forever on `listen`, one at a time. Each accepted FILENAME request spawns a
/// fresh ephemeral socket (also carrying `error_rate`) dedicated to that client.
pub fn serve(listen: &Channel, error_rate: f64) -> ! {
	loop {
		serve_one(listen, error_rate, &[]);
	}
}

/// Accept and fully drive a single session on `listen`, then return. `forced_drops` is passed
/// through to the per-client session socket, for tests that need deterministic loss on the data
/// channel rather than `error_rate`'s randomness; production callers pass an empty slice.
pub fn serve_one(listen: &Channel, error_rate: f64, forced_drops: &[u64]) {
	match wait_for_filename(listen) {
		Some((window_size, buffer_size, filename, client_addr)) => {
			info!("Accepted request for {filename:?} from {client_addr}");
			if run_session(error_rate, forced_drops, window_size, buffer_size, &filename, client_addr).is_err() {
				warn!("Session for {client_addr} ended in error");
			}
		}
		None => {}
	}
}

/// Block on the listening socket until a well-formed FILENAME packet arrives, discarding
/// anything else (malformed datagrams, packets of a different type).
fn wait_for_filename(listen: &Channel) -> Option<(u32, u16, String, SocketAddr)> {
	listen.set_timeout(None).ok()?;
	let mut buf = vec![0u8; MAX_DATAGRAM];

	loop {
		let (n, addr) = match listen.recv_from(&mut buf) {
			Ok(Some(pair)) => pair,
			Ok(None) => continue,
			Err(err) => {
				warn!("Listening socket failed: {err}");
				return None;
			}
		};

		let parsed = match packet::parse(&buf[..n]) {
			Ok(p) => p,
			Err(err) => {
				debug!("Discarding unparseable datagram on listening socket: {err:?}");
				continue;
			}
		};

		if parsed.flag != Flag::FILENAME {
			debug!("Ignoring {:?} packet on listening socket", parsed.flag);
			continue;
		}

		let Some((window_size, buffer_size, name)) = parsed.filename_fields() else {
			debug!("Malformed FILENAME payload, ignoring");
			continue;
		};

		return Some((window_size, buffer_size, String::from_utf8_lossy(name).into_owned(), addr));
	}
}

/// Open the requested file, answer FILENAME_RESP, and if it opened, drive the transfer. Errors
/// here are session-local: the caller logs and goes back to listening.
fn run_session(error_rate: f64, forced_drops: &[u64], window_size: u32, buffer_size: u16, filename: &str, client_addr: SocketAddr) -> Result {
	let session = Channel::bind_with_forced_drops("0.0.0.0:0", error_rate, forced_drops.iter().copied())
		.map_err(|err| warn!("Failed to bind session socket: {err}"))?;

	let reader = match FileReader::open(Path::new(filename), buffer_size as usize) {
		Ok(reader) => reader,
		Err(err) => {
			info!("Cannot open {filename:?}: {err}");
			let resp = packet::build_filename_resp(0, false);
			let _ = session.send_to(&resp, client_addr);
			return Ok(());
		}
	};

	let resp = packet::build_filename_resp(0, true);
	session.send_to(&resp, client_addr).map_err(|err| warn!("Failed to send FILENAME_RESP: {err}"))?;

	send_receive_data(&session, client_addr, reader, window_size, buffer_size as usize)
}

/// Outcome of processing one inbound ack-family datagram against the outstanding window.
enum AckOutcome {
	/// The window slid forward (RR) or a retransmit was queued (SREJ); keep going.
	Progressed,
	/// EOF_ACK for the final packet arrived: the transfer is complete.
	Done,
	/// Not from our peer, not ack-shaped, or otherwise irrelevant.
	Ignored,
}

fn handle_inbound(bytes: &[u8], from: SocketAddr, client_addr: SocketAddr, session: &Channel, window: &mut WindowBuffer, eof_seq: Option<u32>) -> AckOutcome {
	if from != client_addr {
		return AckOutcome::Ignored;
	}

	let parsed = match packet::parse(bytes) {
		Ok(p) => p,
		Err(err) => {
			debug!("Discarding unparseable datagram from client: {err:?}");
			return AckOutcome::Ignored;
		}
	};

	match parsed.flag {
		Flag::RR => {
			let Some(rr) = parsed.ack_seq() else { return AckOutcome::Ignored };
			if rr > window.lower() && rr <= window.current() {
				window.slide_to(rr);
			}
			AckOutcome::Progressed
		}
		Flag::SREJ => {
			let Some(srej) = parsed.ack_seq() else { return AckOutcome::Ignored };
			if let Some(stored) = window.get(srej).and_then(|data| packet::parse(data).ok()) {
				// EOF must stay EOF on retransmission — the receiver's end-of-transfer check
				// keys off the flag, not the sequence number.
				let flag = if stored.flag == Flag::EOF { Flag::EOF } else { Flag::SREJ_DATA };
				let retransmit = packet::build_data(srej, flag, stored.payload);
				let _ = session.send_to(&retransmit, client_addr);
			}
			AckOutcome::Progressed
		}
		Flag::EOF_ACK => {
			let Some(ack) = parsed.ack_seq() else { return AckOutcome::Ignored };
			if eof_seq.is_some_and(|eof| ack == eof) {
				AckOutcome::Done
			} else {
				AckOutcome::Progressed
			}
		}
		other => {
			debug!("Ignoring unexpected {other:?} from client");
			AckOutcome::Ignored
		}
	}
}

/// Drains every ack-family datagram currently queued on `session` without blocking, applying
/// each to `window`. Returns `true` if the transfer completed (EOF_ACK for the final packet
/// arrived) while draining.
fn drain_pending(session: &Channel, client_addr: SocketAddr, window: &mut WindowBuffer, eof_seq: Option<u32>, buf: &mut [u8]) -> Result<bool> {
	session.set_timeout(Some(Duration::ZERO)).map_err(|err| warn!("Failed to set timeout: {err}"))?;

	loop {
		match session.recv_from(buf).map_err(|err| warn!("recv_from failed: {err}"))? {
			None => break,
			Some((n, from)) => {
				if let AckOutcome::Done = handle_inbound(&buf[..n], from, client_addr, session, window, eof_seq) {
					return Ok(true);
				}
			}
		}
	}

	Ok(false)
}

/// Implements SEND_RECEIVE_DATA / LAST_DATA / KILL: fill the window with fresh reads while
/// there's room, drain acks as they arrive, and once EOF has been sent, drop into ack-only
/// waiting until EOF_ACK closes the session or the retry budget is exhausted.
fn send_receive_data(session: &Channel, client_addr: SocketAddr, mut reader: FileReader, window_size: u32, buffer_size: usize) -> Result {
	let mut seq = Sequence::starting_at(1);
	let mut window = WindowBuffer::init(window_size, packet::HEADER_LEN + buffer_size, 1);
	let mut eof_seq = None;
	let mut timeouts = 0u32;
	let mut recv_buf = vec![0u8; MAX_DATAGRAM];

	loop {
		// Fill phase: push fresh reads into the window while it's open and we haven't hit EOF.
		while eof_seq.is_none() && window.is_open() {
			let (chunk, is_eof) = reader.read_chunk().map_err(|err| warn!("Read failed: {err}"))?;
			let n = seq.next();
			let flag = if is_eof { Flag::EOF } else { Flag::DATA };
			let datagram = packet::build_data(n, flag, &chunk);

			session.send_to(&datagram, client_addr).map_err(|err| warn!("send_to failed: {err}"))?;
			window.add(n, &datagram);

			if is_eof {
				eof_seq = Some(n);
			}

			if drain_pending(session, client_addr, &mut window, eof_seq, &mut recv_buf)? {
				return Ok(());
			}
		}

		// Drain phase: wait up to one ack timeout for progress.
		session.set_timeout(Some(SENDER_ACK_TIMEOUT)).map_err(|err| warn!("Failed to set timeout: {err}"))?;

		match session.recv_from(&mut recv_buf).map_err(|err| warn!("recv_from failed: {err}"))? {
			Some((n, from)) => match handle_inbound(&recv_buf[..n], from, client_addr, session, &mut window, eof_seq) {
				AckOutcome::Done => return Ok(()),
				AckOutcome::Progressed | AckOutcome::Ignored => timeouts = 0,
			},
			None => {
				timeouts += 1;
				if timeouts >= TIMEOUT_MAX {
					warn!("Exhausted {TIMEOUT_MAX} retries waiting for {client_addr}, abandoning session");
					return Err(());
				}

				if let Some(data) = window.get_lowest() {
					let parsed = packet::parse(data).map_err(|_| ())?;
					let flag = if parsed.flag == Flag::EOF { Flag::EOF } else { Flag::TIMEOUT_DATA };
					let retransmit = packet::build_data(parsed.seq, flag, parsed.payload);
					session.send_to(&retransmit, client_addr).map_err(|err| warn!("send_to failed: {err}"))?;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn loopback_pair() -> (Channel, Channel, SocketAddr) {
		let session = Channel::bind("127.0.0.1:0").unwrap();
		let peer = Channel::bind("127.0.0.1:0").unwrap();
		let peer_addr = peer.local_addr().unwrap();
		(session, peer, peer_addr)
	}

	#[test]
	fn rr_within_range_slides_window() {
		let (session, _peer, client_addr) = loopback_pair();
		let mut window = WindowBuffer::init(4, 16, 1);
		window.add(1, &packet::build_data(1, Flag::DATA, b"a"));
		window.add(2, &packet::build_data(2, Flag::DATA, b"b"));

		let rr = packet::build_rr(1, 3);
		let outcome = handle_inbound(&rr, client_addr, client_addr, &session, &mut window, None);

		assert!(matches!(outcome, AckOutcome::Progressed));
		assert_eq!(window.lower(), 3);
	}

	#[test]
	fn srej_retransmits_the_requested_slot() {
		let (session, peer, client_addr) = loopback_pair();
		let mut window = WindowBuffer::init(4, 16, 1);
		let original = packet::build_data(1, Flag::DATA, b"payload");
		window.add(1, &original);

		let srej = packet::build_srej(1, 1);
		let outcome = handle_inbound(&srej, client_addr, client_addr, &session, &mut window, None);
		assert!(matches!(outcome, AckOutcome::Progressed));

		peer.set_timeout(Some(Duration::from_millis(500))).unwrap();
		let mut buf = vec![0u8; MAX_DATAGRAM];
		let (n, _) = peer.recv_from(&mut buf).unwrap().expect("retransmit should have been sent");
		let parsed = packet::parse(&buf[..n]).unwrap();
		assert_eq!(parsed.flag, Flag::SREJ_DATA);
		assert_eq!(parsed.seq, 1);
		assert_eq!(parsed.payload, b"payload");
	}

	#[test]
	fn eof_ack_for_final_seq_completes_session() {
		let (session, _peer, client_addr) = loopback_pair();
		let mut window = WindowBuffer::init(4, 16, 1);

		let ack = packet::build_eof_ack(1, 9);
		let outcome = handle_inbound(&ack, client_addr, client_addr, &session, &mut window, Some(9));
		assert!(matches!(outcome, AckOutcome::Done));

		let stale = packet::build_eof_ack(2, 8);
		let outcome = handle_inbound(&stale, client_addr, client_addr, &session, &mut window, Some(9));
		assert!(matches!(outcome, AckOutcome::Progressed));
	}

	#[test]
	fn packet_from_a_different_address_is_ignored() {
		let (session, _peer, client_addr) = loopback_pair();
		let other = Channel::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
		let mut window = WindowBuffer::init(4, 16, 1);

		let rr = packet::build_rr(1, 5);
		let outcome = handle_inbound(&rr, other, client_addr, &session, &mut window, None);
		assert!(matches!(outcome, AckOutcome::Ignored));
	}
}

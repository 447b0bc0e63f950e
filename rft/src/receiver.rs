//! The requesting side of the protocol: asks for a named file, then receives it into a local
//! file, selectively acknowledging as data arrives.

use std::net::SocketAddr;
use std::path::Path;

use log::{debug, info, warn};
use packet::{self, Flag};
use runtime::Channel;
use utils::error::Result;
use window::WindowBuffer;

use crate::constants::{FILENAME_TIMEOUT, LAST_DATA_LINGER, MAX_DATAGRAM, RECEIVER_DATA_TIMEOUT, TIMEOUT_MAX};
use crate::file_io::FileWriter;
use crate::seq::Sequence;

/// Request `from_filename` from `server_addr` and write it to `to_filename`. Returns `Err(())`
/// once the session has been abandoned (the server has no such file, or either side's retry
/// budget was exhausted); the caller is expected to have already logged the reason.
pub fn run(channel: &Channel, server_addr: SocketAddr, window_size: u32, buffer_size: u16, from_filename: &str, to_filename: &Path) -> Result {
	request_filename(channel, server_addr, window_size, buffer_size, from_filename)?;
	let writer = FileWriter::create(to_filename).map_err(|err| warn!("Cannot create {to_filename:?}: {err}"))?;
	receive_data(channel, server_addr, window_size, writer)
}

/// SEND_FILENAME / SEND_FILENAME_TIMEOUT / WAIT_FOR_FILENAME_ACK: resend the FILENAME request
/// every [`FILENAME_TIMEOUT`] until a FILENAME_RESP arrives or the retry budget runs out.
fn request_filename(channel: &Channel, server_addr: SocketAddr, window_size: u32, buffer_size: u16, filename: &str) -> Result {
	let request = packet::build_filename(0, window_size, buffer_size, filename.as_bytes());
	let mut buf = vec![0u8; MAX_DATAGRAM];

	for attempt in 0..TIMEOUT_MAX {
		channel.send_to(&request, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;
		channel.set_timeout(Some(FILENAME_TIMEOUT)).map_err(|err| warn!("Failed to set timeout: {err}"))?;

		loop {
			match channel.recv_from(&mut buf).map_err(|err| warn!("recv_from failed: {err}"))? {
				None => break,
				Some((n, from)) if from == server_addr => {
					let Ok(parsed) = packet::parse(&buf[..n]) else { continue };
					if parsed.flag != Flag::FILENAME_RESP {
						continue;
					}
					return match parsed.filename_resp_ok() {
						Some(true) => Ok(()),
						_ => {
							info!("Server reports {filename:?} could not be opened");
							Err(())
						}
					};
				}
				Some(_) => continue,
			}
		}

		debug!("FILENAME timed out, retrying ({}/{TIMEOUT_MAX})", attempt + 1);
	}

	warn!("Exhausted {TIMEOUT_MAX} retries waiting for FILENAME_RESP");
	Err(())
}

/// RECEIVE_FIRST_DATA / RECEIVE_DATA / RECEIVE_DATA_TIMEOUT / BAD_DATA / BUFFER_DATA /
/// PROCESS_DATA / LAST_DATA / KILL: receive data packets, writing in-order arrivals straight to
/// disk, buffering out-of-order ones, and selectively re-requesting gaps.
fn receive_data(channel: &Channel, server_addr: SocketAddr, window_size: u32, mut writer: FileWriter) -> Result {
	let mut ack_seq = Sequence::starting_at(0);
	let mut window = WindowBuffer::init(window_size, packet::PAYLOAD_MAX, 1);
	let mut ready = Vec::new();
	let mut buf = vec![0u8; MAX_DATAGRAM];
	let mut timeouts = 0u32;
	// Set as soon as an EOF is seen, whether processed immediately or buffered out of order —
	// `window`'s slots hold raw payload bytes only, so the flag can't be recovered once a
	// retransmitted EOF gets flushed later by `in_order_valid_prefix`.
	let mut eof_seq: Option<u32> = None;

	channel.set_timeout(Some(RECEIVER_DATA_TIMEOUT)).map_err(|err| warn!("Failed to set timeout: {err}"))?;

	loop {
		let (n, from) = match channel.recv_from(&mut buf).map_err(|err| warn!("recv_from failed: {err}"))? {
			Some(pair) => pair,
			None => {
				timeouts += 1;
				if timeouts >= TIMEOUT_MAX {
					warn!("Exhausted {TIMEOUT_MAX} retries waiting for data from {server_addr}");
					return Err(());
				}
				continue;
			}
		};

		if from != server_addr {
			continue;
		}

		let parsed = match packet::parse(&buf[..n]) {
			Ok(p) => p,
			Err(err) => {
				debug!("Discarding unparseable datagram: {err:?}");
				continue;
			}
		};

		if !parsed.flag.is_data_like() {
			debug!("Ignoring non-data {:?} on data channel", parsed.flag);
			continue;
		}

		timeouts = 0;

		let expected = window.lower();

		if parsed.flag == Flag::EOF {
			eof_seq = Some(parsed.seq);
		}

		if parsed.seq < expected {
			// Already written; the server just hasn't seen our ack yet. Re-ack.
			let ack = packet::build_rr(ack_seq.next(), window.lower());
			channel.send_to(&ack, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;
			continue;
		}

		if parsed.seq >= window.upper() {
			debug!("Discarding out-of-window seq {} (window is [{}, {}))", parsed.seq, window.lower(), window.upper());
			continue;
		}

		if parsed.seq == expected {
			writer.write_chunk(parsed.payload).map_err(|err| warn!("Write failed: {err}"))?;
			window.add(parsed.seq, parsed.payload);

			window.in_order_valid_prefix(&mut ready);
			for &seq in ready.iter().skip(1) {
				let chunk = window.get(seq).expect("just listed as valid");
				writer.write_chunk(chunk).map_err(|err| warn!("Write failed: {err}"))?;
			}

			let new_lower = window.lower() + ready.len() as u32;
			window.slide_to(new_lower);

			// The packet that triggered this slide need not be the EOF itself: it may have
			// arrived earlier and been buffered out of order, only now getting flushed as the
			// gap ahead of it closes.
			if let Some(eof) = eof_seq {
				if window.lower() > eof {
					send_eof_ack_and_linger(channel, server_addr, eof)?;
					return Ok(());
				}
			}

			let ack = packet::build_rr(ack_seq.next(), window.lower());
			channel.send_to(&ack, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;
		} else {
			window.add(parsed.seq, parsed.payload);
			let srej = packet::build_srej(ack_seq.next(), expected);
			channel.send_to(&srej, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;
		}
	}
}

/// LAST_DATA: having written the final chunk, acknowledge it and linger briefly in case the
/// server didn't see the first EOF_ACK and retransmits EOF, before exiting regardless.
fn send_eof_ack_and_linger(channel: &Channel, server_addr: SocketAddr, final_seq: u32) -> Result {
	let mut ack_seq = Sequence::starting_at(1);
	let ack = packet::build_eof_ack(ack_seq.next(), final_seq);
	channel.send_to(&ack, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;

	channel.set_timeout(Some(LAST_DATA_LINGER)).map_err(|err| warn!("Failed to set timeout: {err}"))?;
	let mut buf = vec![0u8; MAX_DATAGRAM];

	for _ in 0..TIMEOUT_MAX {
		match channel.recv_from(&mut buf).map_err(|err| warn!("recv_from failed: {err}"))? {
			None => return Ok(()),
			Some((n, from)) if from == server_addr => {
				if let Ok(parsed) = packet::parse(&buf[..n]) {
					if parsed.flag == Flag::EOF && parsed.seq == final_seq {
						let ack = packet::build_eof_ack(ack_seq.next(), final_seq);
						channel.send_to(&ack, server_addr).map_err(|err| warn!("send_to failed: {err}"))?;
					}
				}
			}
			Some(_) => continue,
		}
	}

	Ok(())
}

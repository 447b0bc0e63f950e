use std::cell::Cell;
use std::collections::HashSet;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use log::{debug, trace};
use rand::Rng;

/// A UDP socket wrapping simulated transport errors on the sending side: with probability
/// `error_rate` an outgoing datagram is dropped entirely, and otherwise, with a smaller
/// independent probability, a single byte is corrupted. `recv_from` is unaffected — this models
/// a lossy uplink, matching the original exercise's error-injection behaviour.
///
/// Alongside the random injector, a channel can carry a deterministic forced-drop table: a set
/// of zero-based send indices (counting every [`Channel::send_to`] call made on this channel)
/// that are dropped unconditionally. This exists for tests that need reproducible loss/reorder
/// scenarios instead of `rand`'s randomness.
pub struct Channel {
	socket: UdpSocket,
	error_rate: f64,
	forced_drops: HashSet<u64>,
	sent: Cell<u64>,
}

/// The fraction of non-dropped sends that instead get a single bit flipped, conditioned on the
/// overall `error_rate` so that a higher error rate produces proportionally more corruption too.
const FLIP_SHARE: f64 = 0.5;

impl Channel {
	/// Bind a socket at `addr` (use port 0 for an OS-assigned ephemeral port) with no injected
	/// errors.
	pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
		Self::bind_with_forced_drops(addr, 0.0, [])
	}

	/// As [`Channel::bind`], configuring the injected error rate.
	pub fn bind_with_error_rate(addr: impl ToSocketAddrs, error_rate: f64) -> io::Result<Self> {
		Self::bind_with_forced_drops(addr, error_rate, [])
	}

	/// As [`Channel::bind_with_error_rate`], additionally dropping every outgoing datagram whose
	/// zero-based send index (the Nth call to [`Channel::send_to`] on this channel) is in
	/// `forced_drops`, regardless of `error_rate`. Intended for deterministic tests driving
	/// specific loss/reorder scenarios.
	pub fn bind_with_forced_drops(addr: impl ToSocketAddrs, error_rate: f64, forced_drops: impl IntoIterator<Item = u64>) -> io::Result<Self> {
		Ok(Self { socket: UdpSocket::bind(addr)?, error_rate, forced_drops: forced_drops.into_iter().collect(), sent: Cell::new(0) })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}

	/// Set the timeout applied to [`Channel::recv_from`]. `None` blocks indefinitely.
	pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
		self.socket.set_read_timeout(timeout)
	}

	/// Send a datagram, possibly dropping or corrupting it according to `error_rate`, or
	/// dropping it unconditionally per the forced-drop table.
	pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
		let index = self.sent.get();
		self.sent.set(index + 1);

		if self.forced_drops.contains(&index) {
			debug!("Forced drop of outgoing datagram #{index} ({} bytes)", buf.len());
			return Ok(());
		}

		let mut rng = rand::thread_rng();

		if self.error_rate > 0.0 && rng.gen_bool(self.error_rate.clamp(0.0, 1.0)) {
			if rng.gen_bool(FLIP_SHARE) {
				debug!("Injector dropping outgoing datagram ({} bytes)", buf.len());
				return Ok(());
			}

			let mut corrupted = buf.to_vec();
			let idx = rng.gen_range(0..corrupted.len());
			// XOR with a nonzero value so the byte actually changes.
			corrupted[idx] ^= rng.gen_range(1..=255);

			trace!("Injector flipping byte {idx} of outgoing datagram");
			self.socket.send_to(&corrupted, addr)?;
			return Ok(());
		}

		self.socket.send_to(buf, addr)?;
		Ok(())
	}

	/// Receive a datagram, waiting up to the configured timeout. Returns `Ok(None)` if the
	/// timeout elapsed with nothing ready, distinguishing "nothing to read yet" from a real
	/// I/O failure.
	pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
		match self.socket.recv_from(buf) {
			Ok((n, addr)) => Ok(Some((n, addr))),
			Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
			Err(err) => Err(err),
		}
	}
}

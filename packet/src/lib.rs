//! Wire format for the file-transfer protocol: a fixed 7-octet header followed by a
//! flag-discriminated payload. See the module-level docs on [`Header`] and [`Flag`] for the
//! exact layout.

use checksum::Checksum;
use log::warn;
use utils::bytes::{self, Cast};
use utils::endian::u32be;

/// Maximum payload carried by a single datagram.
pub const PAYLOAD_MAX: usize = 1400;
/// Minimum payload for a DATA-family packet.
pub const PAYLOAD_MIN: usize = 1;
/// Maximum length, in bytes, of a filename carried in a FILENAME packet.
pub const FILENAME_MAX: usize = 100;
/// Size of the fixed header, in bytes: 4 (sequence number) + 2 (checksum) + 1 (flag).
pub const HEADER_LEN: usize = 7;

/// The flag octet, discriminating the six datagram types.
#[derive(Clone, Copy, PartialEq, Eq, Cast)]
#[repr(transparent)]
pub struct Flag(pub u8);

impl Flag {
	pub const RR: Self = Self(5);
	pub const SREJ: Self = Self(6);
	pub const FILENAME: Self = Self(8);
	pub const FILENAME_RESP: Self = Self(9);
	pub const EOF: Self = Self(10);
	pub const DATA: Self = Self(16);
	pub const SREJ_DATA: Self = Self(17);
	pub const TIMEOUT_DATA: Self = Self(18);
	pub const EOF_ACK: Self = Self(20);

	/// Whether this byte corresponds to one of the flags defined above.
	fn is_known(self) -> bool {
		matches!(
			self,
			Self::RR | Self::SREJ | Self::FILENAME | Self::FILENAME_RESP | Self::EOF | Self::DATA | Self::SREJ_DATA | Self::TIMEOUT_DATA | Self::EOF_ACK
		)
	}

	/// Whether this flag marks a retransmission-eligible data packet (the four that carry
	/// a stored window slot: the original send, the two retransmission reasons, and EOF).
	pub fn is_data_like(self) -> bool {
		matches!(self, Self::DATA | Self::SREJ_DATA | Self::TIMEOUT_DATA | Self::EOF)
	}
}

impl core::fmt::Debug for Flag {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		let name = match *self {
			Self::RR => "RR",
			Self::SREJ => "SREJ",
			Self::FILENAME => "FILENAME",
			Self::FILENAME_RESP => "FILENAME_RESP",
			Self::EOF => "EOF",
			Self::DATA => "DATA",
			Self::SREJ_DATA => "SREJ_DATA",
			Self::TIMEOUT_DATA => "TIMEOUT_DATA",
			Self::EOF_ACK => "EOF_ACK",
			Self(n) => return write!(f, "Flag({n})"),
		};
		f.write_str(name)
	}
}

/// The fixed 7-octet packet header, transmitted with no padding.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct Header {
	pub seq: u32be,
	pub cksum: [u8; 2],
	pub flag: Flag,
}

/// Why a received datagram could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
	/// Smaller than the fixed header.
	Truncated,
	/// The one's-complement sum over the whole datagram is nonzero.
	BadChecksum,
	/// The flag octet isn't one of the nine defined values.
	UnknownFlag(u8),
}

/// A successfully parsed, checksum-verified datagram.
pub struct Parsed<'a> {
	pub seq: u32,
	pub flag: Flag,
	pub payload: &'a [u8],
}

impl<'a> Parsed<'a> {
	/// The acknowledged sequence number carried by an RR or SREJ payload.
	pub fn ack_seq(&self) -> Option<u32> {
		if self.payload.len() < 4 {
			return None;
		}
		Some(u32::from_be_bytes(self.payload[..4].try_into().unwrap()))
	}

	/// `(window_size, buffer_size, filename)` from a FILENAME payload.
	pub fn filename_fields(&self) -> Option<(u32, u16, &'a [u8])> {
		if self.payload.len() < 6 {
			return None;
		}
		let window_size = u32::from_be_bytes(self.payload[0..4].try_into().unwrap());
		let buffer_size = u16::from_be_bytes(self.payload[4..6].try_into().unwrap());
		let name = &self.payload[6..];
		if name.len() > FILENAME_MAX {
			return None;
		}
		Some((window_size, buffer_size, name))
	}

	/// Whether a FILENAME_RESP payload signals that the file was opened successfully.
	pub fn filename_resp_ok(&self) -> Option<bool> {
		self.payload.first().map(|&b| b != 0)
	}
}

fn build(seq: u32, flag: Flag, payload: &[u8]) -> Vec<u8> {
	let mut buf = vec![0u8; HEADER_LEN + payload.len()];

	{
		let header: &mut Header = bytes::cast_mut(&mut buf[..HEADER_LEN]);
		header.seq = seq.into();
		header.cksum = [0, 0];
		header.flag = flag;
	}

	buf[HEADER_LEN..].copy_from_slice(payload);

	let cksum = Checksum::of(&buf).end();
	bytes::cast_mut::<Header, _>(&mut buf[..HEADER_LEN]).cksum = cksum;

	buf
}

/// Build an RR (receiver-ready) packet: cumulative ack for everything below `rr_seq`.
pub fn build_rr(seq: u32, rr_seq: u32) -> Vec<u8> {
	build(seq, Flag::RR, &rr_seq.to_be_bytes())
}

/// Build an SREJ (selective-reject) packet requesting retransmission of `srej_seq`.
pub fn build_srej(seq: u32, srej_seq: u32) -> Vec<u8> {
	build(seq, Flag::SREJ, &srej_seq.to_be_bytes())
}

/// Build an EOF_ACK packet, acknowledging that the transfer is complete up to `ack_seq`.
pub fn build_eof_ack(seq: u32, ack_seq: u32) -> Vec<u8> {
	build(seq, Flag::EOF_ACK, &ack_seq.to_be_bytes())
}

/// Build a data-family packet. `flag` must be one of `DATA`, `SREJ_DATA`, `TIMEOUT_DATA`, or
/// `EOF`; `payload` must be at most `PAYLOAD_MAX` bytes, and at least `PAYLOAD_MIN` unless
/// `flag` is `EOF` — the final chunk of an empty file has no bytes left to carry.
pub fn build_data(seq: u32, flag: Flag, payload: &[u8]) -> Vec<u8> {
	debug_assert!(flag.is_data_like());
	debug_assert!(flag == Flag::EOF || payload.len() >= PAYLOAD_MIN);
	debug_assert!(payload.len() <= PAYLOAD_MAX);
	build(seq, flag, payload)
}

/// Build a FILENAME packet: the requested window/buffer sizes and the filename to open.
pub fn build_filename(seq: u32, window_size: u32, buffer_size: u16, name: &[u8]) -> Vec<u8> {
	debug_assert!(name.len() <= FILENAME_MAX);

	let mut payload = Vec::with_capacity(6 + name.len());
	payload.extend_from_slice(&window_size.to_be_bytes());
	payload.extend_from_slice(&buffer_size.to_be_bytes());
	payload.extend_from_slice(name);

	build(seq, Flag::FILENAME, &payload)
}

/// Build a FILENAME_RESP packet: whether the sender was able to open the requested file.
pub fn build_filename_resp(seq: u32, ok: bool) -> Vec<u8> {
	build(seq, Flag::FILENAME_RESP, &[ok as u8])
}

/// Parse and checksum-verify a received datagram. `parse` is total: every byte slice yields
/// either a [`Parsed`] view or a typed [`ParseError`], never a panic.
pub fn parse(bytes: &[u8]) -> Result<Parsed<'_>, ParseError> {
	if bytes.len() < HEADER_LEN {
		return Err(ParseError::Truncated);
	}

	if Checksum::of(bytes).end() != [0, 0] {
		return Err(ParseError::BadChecksum);
	}

	let header: &Header = bytes::cast(&bytes[..HEADER_LEN]);

	if !header.flag.is_known() {
		warn!("Received packet with unknown flag {}", header.flag.0);
		return Err(ParseError::UnknownFlag(header.flag.0));
	}

	Ok(Parsed { seq: header.seq.get(), flag: header.flag, payload: &bytes[HEADER_LEN..] })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_then_parse_round_trips_rr() {
		let bytes = build_rr(4, 7);
		let parsed = parse(&bytes).expect("freshly built packet should parse");
		assert_eq!(parsed.seq, 4);
		assert_eq!(parsed.flag, Flag::RR);
		assert_eq!(parsed.ack_seq(), Some(7));
	}

	#[test]
	fn build_then_parse_round_trips_data() {
		let payload = b"hello, world";
		let bytes = build_data(12, Flag::DATA, payload);
		let parsed = parse(&bytes).unwrap();
		assert_eq!(parsed.seq, 12);
		assert_eq!(parsed.flag, Flag::DATA);
		assert_eq!(parsed.payload, payload);
	}

	#[test]
	fn build_then_parse_round_trips_filename() {
		let bytes = build_filename(0, 10, 512, b"report.pdf");
		let parsed = parse(&bytes).unwrap();
		assert_eq!(parsed.flag, Flag::FILENAME);
		let (window_size, buffer_size, name) = parsed.filename_fields().unwrap();
		assert_eq!(window_size, 10);
		assert_eq!(buffer_size, 512);
		assert_eq!(name, b"report.pdf");
	}

	#[test]
	fn build_then_parse_round_trips_filename_resp() {
		let ok = build_filename_resp(0, true);
		assert_eq!(parse(&ok).unwrap().filename_resp_ok(), Some(true));

		let not_found = build_filename_resp(0, false);
		assert_eq!(parse(&not_found).unwrap().filename_resp_ok(), Some(false));
	}

	#[test]
	fn build_then_parse_round_trips_eof_ack() {
		let bytes = build_eof_ack(9, 42);
		let parsed = parse(&bytes).unwrap();
		assert_eq!(parsed.flag, Flag::EOF_ACK);
		assert_eq!(parsed.ack_seq(), Some(42));
	}

	#[test]
	fn single_byte_mutation_causes_bad_checksum() {
		let mut bytes = build_data(3, Flag::DATA, b"payload");

		// Flip a bit somewhere in the packet (header or payload) and confirm the checksum
		// catches it. Excluding no bytes: any single flipped bit must be caught.
		for i in 0..bytes.len() {
			let mut mutated = bytes.clone();
			mutated[i] ^= 0x01;
			assert_eq!(parse(&mutated), Err(ParseError::BadChecksum), "byte {i} mutation went undetected");
		}

		// Sanity: the original is still valid.
		assert!(parse(&bytes).is_ok());
		bytes[0] ^= 0xFF;
		assert!(parse(&bytes).is_err());
	}

	#[test]
	fn truncated_packet_is_rejected() {
		assert_eq!(parse(&[1, 2, 3]), Err(ParseError::Truncated));
		assert_eq!(parse(&[]), Err(ParseError::Truncated));
	}

	#[test]
	fn unknown_flag_is_rejected() {
		// Build a DATA packet then rewrite the flag byte to something undefined,
		// recomputing the checksum so the only failure mode under test is the flag.
		let mut bytes = build_data(1, Flag::DATA, b"x");
		bytes[6] = 200;
		let cksum = {
			bytes[4..6].copy_from_slice(&[0, 0]);
			Checksum::of(&bytes).end()
		};
		bytes[4..6].copy_from_slice(&cksum);

		assert_eq!(parse(&bytes), Err(ParseError::UnknownFlag(200)));
	}
}

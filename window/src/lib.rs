//! The sliding-window buffer shared by the sender and receiver: a fixed-capacity circular
//! buffer indexed by sequence number modulo the window size, tracking per-slot validity and
//! three 32-bit cursors (`lower`, `current`, `upper`).
//!
//! The same structure backs both directions: on the sender it holds outstanding packets
//! awaiting acknowledgement; on the receiver it holds out-of-order packets awaiting a gap to
//! be filled. Slots are pre-allocated once at [`WindowBuffer::init`] and reused in place by
//! [`WindowBuffer::add`], so steady-state operation never allocates.

struct Slot {
	valid: bool,
	len: usize,
	buf: Vec<u8>,
}

impl Slot {
	fn empty(capacity: usize) -> Self {
		Self { valid: false, len: 0, buf: vec![0; capacity] }
	}

	fn store(&mut self, data: &[u8]) {
		if data.len() > self.buf.len() {
			self.buf.resize(data.len(), 0);
		}

		self.buf[..data.len()].copy_from_slice(data);
		self.len = data.len();
		self.valid = true;
	}

	fn bytes(&self) -> &[u8] {
		&self.buf[..self.len]
	}
}

/// A fixed-capacity, modulo-indexed window of in-flight or out-of-order packets.
pub struct WindowBuffer {
	window_size: u32,
	lower: u32,
	current: u32,
	upper: u32,
	slots: Vec<Slot>,
}

impl WindowBuffer {
	/// Allocate `window_size` slots, each pre-sized to hold `slot_capacity` bytes, with the
	/// cursors starting at `start` (the first sequence number this side will send or expect).
	pub fn init(window_size: u32, slot_capacity: usize, start: u32) -> Self {
		assert!(window_size > 0, "window size must be nonzero");

		let slots = (0..window_size).map(|_| Slot::empty(slot_capacity)).collect();

		Self { window_size, lower: start, current: start, upper: start + window_size, slots }
	}

	pub fn window_size(&self) -> u32 {
		self.window_size
	}

	pub fn lower(&self) -> u32 {
		self.lower
	}

	pub fn current(&self) -> u32 {
		self.current
	}

	pub fn upper(&self) -> u32 {
		self.upper
	}

	/// The window is open when there's room for another packet without waiting for an ack.
	pub fn is_open(&self) -> bool {
		self.current < self.upper
	}

	#[inline]
	fn index(&self, seq: u32) -> usize {
		(seq % self.window_size) as usize
	}

	/// Store `data` at the slot for `seq`, marking it valid, and advance `current` to
	/// `max(current, seq + 1)`. On the sender, a sequential producer always calls this with
	/// `seq == current`, so `current` simply increments by one. On the receiver, `seq` may run
	/// ahead of `lower` for an out-of-order arrival; `current` still needs to track the
	/// furthest slot filled so far, so the same advance applies regardless of ordering.
	pub fn add(&mut self, seq: u32, data: &[u8]) {
		let idx = self.index(seq);
		self.slots[idx].store(data);
		self.current = self.current.max(seq + 1);
	}

	/// Whether the slot for `seq` currently holds a valid packet.
	pub fn is_valid(&self, seq: u32) -> bool {
		self.slots[self.index(seq)].valid
	}

	/// The stored bytes for `seq`, if that slot is currently valid.
	pub fn get(&self, seq: u32) -> Option<&[u8]> {
		let slot = &self.slots[self.index(seq)];
		slot.valid.then(|| slot.bytes())
	}

	/// The contents of the oldest outstanding slot, for retransmission on timeout.
	pub fn get_lowest(&self) -> Option<&[u8]> {
		self.get(self.lower)
	}

	/// Advance `lower` to `new_lower`, recompute `upper`, and invalidate every slot whose
	/// sequence number is now below `lower`. `new_lower` must not move the window backwards.
	pub fn slide_to(&mut self, new_lower: u32) {
		assert!(new_lower >= self.lower, "window cannot slide backwards");

		for seq in self.lower..new_lower {
			let idx = self.index(seq);
			self.slots[idx].valid = false;
		}

		self.lower = new_lower;
		self.upper = new_lower + self.window_size;
	}

	/// Append, in order, the sequence numbers in `[lower, current)` whose slots are valid,
	/// stopping at the first invalid slot. Writes into a caller-owned scratch `Vec` instead of
	/// allocating, so repeated flushes in a polling loop don't churn the allocator.
	pub fn in_order_valid_prefix(&self, out: &mut Vec<u32>) {
		out.clear();

		let mut seq = self.lower;
		while seq < self.current {
			if !self.slots[self.index(seq)].valid {
				break;
			}

			out.push(seq);
			seq += 1;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::WindowBuffer;

	fn invariants_hold(w: &WindowBuffer) {
		assert!(w.lower() <= w.current());
		assert!(w.current() <= w.upper());
		assert_eq!(w.upper() - w.lower(), w.window_size());
	}

	#[test]
	fn starts_open_with_correct_cursors() {
		let w = WindowBuffer::init(4, 16, 1);
		assert_eq!(w.lower(), 1);
		assert_eq!(w.current(), 1);
		assert_eq!(w.upper(), 5);
		assert!(w.is_open());
		invariants_hold(&w);
	}

	#[test]
	fn sequential_add_closes_and_reopens_window() {
		let mut w = WindowBuffer::init(3, 16, 1);

		for seq in 1..4 {
			assert!(w.is_open());
			w.add(seq, &[seq as u8]);
			invariants_hold(&w);
		}

		assert!(!w.is_open());

		w.slide_to(2);
		invariants_hold(&w);
		assert!(w.is_open());
		assert!(!w.is_valid(1));
		assert!(w.is_valid(2));
		assert!(w.is_valid(3));
	}

	#[test]
	fn re_adding_a_slot_does_not_move_current_backwards() {
		let mut w = WindowBuffer::init(4, 16, 1);
		w.add(1, b"a");
		w.add(2, b"b");

		let current_before = w.current();
		w.add(1, b"a-retransmit");
		assert_eq!(w.current(), current_before);
		assert_eq!(w.get(1), Some(&b"a-retransmit"[..]));
	}

	#[test]
	fn in_order_valid_prefix_stops_at_first_gap() {
		let mut w = WindowBuffer::init(5, 16, 1);

		// Out-of-order arrival: 1, 3, 4 — 2 is missing.
		w.add(1, b"1");
		w.add(3, b"3");
		w.add(4, b"4");

		let mut out = Vec::new();
		w.in_order_valid_prefix(&mut out);
		assert_eq!(out, vec![1]);

		w.add(2, b"2");
		w.in_order_valid_prefix(&mut out);
		assert_eq!(out, vec![1, 2, 3, 4]);
	}

	#[test]
	fn get_lowest_returns_oldest_outstanding_packet() {
		let mut w = WindowBuffer::init(4, 16, 1);
		w.add(1, b"first");
		w.add(2, b"second");
		assert_eq!(w.get_lowest(), Some(&b"first"[..]));
	}

	#[test]
	#[should_panic(expected = "window cannot slide backwards")]
	fn slide_to_rejects_backwards_motion() {
		let mut w = WindowBuffer::init(4, 16, 5);
		w.slide_to(3);
	}
}

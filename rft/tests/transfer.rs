//! Loopback integration tests driving the sender and receiver state machines against each
//! other over real UDP sockets on localhost.

use std::fs;
use std::thread;

use runtime::Channel;

fn spawn_sender(error_rate: f64) -> std::net::SocketAddr {
	let listen = Channel::bind_with_error_rate("127.0.0.1:0", error_rate).unwrap();
	let addr = listen.local_addr().unwrap();
	thread::spawn(move || rft::sender::serve(&listen, error_rate));
	addr
}

/// As [`spawn_sender`], but serves exactly one session whose per-client socket deterministically
/// drops the outgoing datagrams at `forced_drops` (zero-based send indices on that socket: 0 is
/// FILENAME_RESP, 1.. are the DATA packets in send order). Used to drive reproducible
/// loss/reorder scenarios instead of relying on `error_rate`'s randomness.
fn spawn_sender_with_forced_drops(forced_drops: &'static [u64]) -> std::net::SocketAddr {
	let listen = Channel::bind("127.0.0.1:0").unwrap();
	let addr = listen.local_addr().unwrap();
	thread::spawn(move || rft::sender::serve_one(&listen, 0.0, forced_drops));
	addr
}

#[test]
fn clean_transfer_round_trips_file_contents() {
	let source = tempfile::NamedTempFile::new().unwrap();
	let contents: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
	fs::write(source.path(), &contents).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	let server_addr = spawn_sender(0.0);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 8, 512, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), contents);
}

#[test]
fn small_window_still_completes_a_multi_packet_transfer() {
	let source = tempfile::NamedTempFile::new().unwrap();
	let contents: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();
	fs::write(source.path(), &contents).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	let server_addr = spawn_sender(0.0);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	// Window of 1 forces strict stop-and-wait: every packet must be acked before the next is
	// sent, exercising the drain phase on every iteration.
	let result = rft::receiver::run(&client, server_addr, 1, 256, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), contents);
}

#[test]
fn empty_file_transfers_as_a_single_eof_packet() {
	let source = tempfile::NamedTempFile::new().unwrap();
	fs::write(source.path(), []).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	let server_addr = spawn_sender(0.0);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 4, 256, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), Vec::<u8>::new());
}

#[test]
fn missing_file_is_reported_as_an_error_without_creating_the_destination() {
	let dest = tempfile::NamedTempFile::new().unwrap();
	fs::remove_file(dest.path()).unwrap();

	let server_addr = spawn_sender(0.0);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 4, 256, "definitely-does-not-exist.bin", dest.path());

	assert!(result.is_err());
	assert!(!dest.path().exists());
}

#[test]
fn single_dropped_packet_is_recovered_via_retransmission() {
	let source = tempfile::NamedTempFile::new().unwrap();
	let contents: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
	fs::write(source.path(), &contents).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	// Send index 0 is FILENAME_RESP, so index 5 drops the fifth DATA packet's first send.
	let server_addr = spawn_sender_with_forced_drops(&[5]);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 8, 512, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), contents);
}

#[test]
fn burst_loss_of_consecutive_packets_is_recovered() {
	let source = tempfile::NamedTempFile::new().unwrap();
	let contents: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
	fs::write(source.path(), &contents).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	// Drops three consecutive DATA packets' first sends (indices 5, 6, 7), forcing the receiver
	// through repeated SREJ/timeout-driven retransmission to fill the gap.
	let server_addr = spawn_sender_with_forced_drops(&[5, 6, 7]);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 8, 512, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), contents);
}

#[test]
fn out_of_order_eof_is_recognized_once_the_gap_behind_it_is_filled() {
	let source = tempfile::NamedTempFile::new().unwrap();
	// 450 bytes at a 100-byte buffer makes exactly five packets (100, 100, 100, 100, 50), and a
	// window of 5 lets the sender push all five before waiting for any ack.
	let contents: Vec<u8> = (0..450u32).map(|i| (i % 256) as u8).collect();
	fs::write(source.path(), &contents).unwrap();

	let dest = tempfile::NamedTempFile::new().unwrap();

	// Send index 0 is FILENAME_RESP; index 3 drops the third DATA packet's (seq 3) first send.
	// The fourth and fifth packets — the fifth being EOF — arrive first and get buffered by the
	// receiver's window as out-of-order, before the SREJ-triggered retransmit of seq 3 fills the
	// gap and flushes them. The EOF must still be recognized once that flush lands seq 5.
	let server_addr = spawn_sender_with_forced_drops(&[3]);
	let client = Channel::bind("127.0.0.1:0").unwrap();

	let result = rft::receiver::run(&client, server_addr, 5, 100, source.path().to_str().unwrap(), dest.path());

	assert!(result.is_ok());
	assert_eq!(fs::read(dest.path()).unwrap(), contents);
}

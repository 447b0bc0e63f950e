use std::net::ToSocketAddrs;
use std::path::PathBuf;

use clap::Parser;
use log::{error, LevelFilter};
use runtime::Channel;

/// Requests a file from a `server` instance and writes it to disk.
#[derive(Parser)]
#[command(name = "rcopy")]
struct Args {
	/// Name of the file to request from the server.
	from_filename: String,
	/// Local path to write the received file to.
	to_filename: PathBuf,
	/// Sliding window size, in packets.
	window_size: u32,
	/// Bytes of file data carried per packet.
	buffer_size: u16,
	/// Probability in [0.0, 1.0] that an outgoing datagram is dropped or corrupted.
	error_rate: f64,
	/// Hostname or address of the server.
	server_host: String,
	/// Port the server is listening on.
	server_port: u16,
}

fn validate(args: &Args) -> Result<(), String> {
	if args.from_filename.len() > packet::FILENAME_MAX {
		return Err(format!("from-filename must be at most {} bytes", packet::FILENAME_MAX));
	}
	if !(1..=(1 << 30)).contains(&args.window_size) {
		return Err("window-size must be within [1, 2^30]".into());
	}
	if !(1..=packet::PAYLOAD_MAX as u16).contains(&args.buffer_size) {
		return Err(format!("buffer-size must be within [1, {}]", packet::PAYLOAD_MAX));
	}
	if !(0.0..=1.0).contains(&args.error_rate) {
		return Err("error-rate must be within [0.0, 1.0]".into());
	}
	if args.server_port == 0 {
		return Err("server-port must be within [1, 65535]".into());
	}
	Ok(())
}

fn main() {
	runtime::init_logger(LevelFilter::Info);

	let args = match Args::try_parse() {
		Ok(args) => args,
		Err(err) => {
			error!("{err}");
			std::process::exit(1);
		}
	};

	if let Err(msg) = validate(&args) {
		error!("{msg}");
		std::process::exit(1);
	}

	let server_addr = match (args.server_host.as_str(), args.server_port).to_socket_addrs() {
		Ok(mut addrs) => match addrs.next() {
			Some(addr) => addr,
			None => {
				error!("Could not resolve {}:{}", args.server_host, args.server_port);
				std::process::exit(1);
			}
		},
		Err(err) => {
			error!("Could not resolve {}:{}: {err}", args.server_host, args.server_port);
			std::process::exit(1);
		}
	};

	let channel = match Channel::bind_with_error_rate("0.0.0.0:0", args.error_rate) {
		Ok(channel) => channel,
		Err(err) => {
			error!("Failed to bind local socket: {err}");
			std::process::exit(1);
		}
	};

	let result = rft::receiver::run(&channel, server_addr, args.window_size, args.buffer_size, &args.from_filename, &args.to_filename);

	std::process::exit(if result.is_ok() { 0 } else { 1 });
}

use clap::Parser;
use log::{error, info, LevelFilter};
use runtime::Channel;

/// Serves files to `rcopy` clients over a lossy UDP transport.
#[derive(Parser)]
#[command(name = "server")]
struct Args {
	/// Probability in [0.0, 1.0] that an outgoing datagram is dropped or corrupted.
	error_rate: f64,

	/// Port to listen on; an OS-assigned ephemeral port is used if omitted.
	port: Option<u16>,
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

	if !(0.0..=1.0).contains(&args.error_rate) {
		error!("error-rate must be within [0.0, 1.0], got {}", args.error_rate);
		std::process::exit(1);
	}

	let bind_addr = format!("0.0.0.0:{}", args.port.unwrap_or(0));
	let listen = match Channel::bind_with_error_rate(&bind_addr, args.error_rate) {
		Ok(channel) => channel,
		Err(err) => {
			error!("Failed to bind {bind_addr}: {err}");
			std::process::exit(1);
		}
	};

	match listen.local_addr() {
		Ok(addr) => info!("Listening on {addr} (error rate {:.3})", args.error_rate),
		Err(err) => {
			error!("Failed to read local address: {err}");
			std::process::exit(1);
		}
	}

	rft::sender::serve(&listen, args.error_rate);
}

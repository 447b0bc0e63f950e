mod channel;
pub mod logger;

pub use channel::Channel;

/// Install the terminal logger as the global `log` sink, honoring `RUST_LOG` if set and
/// falling back to `default` otherwise.
pub fn init_logger(default: log::LevelFilter) {
	let level = std::env::var("RUST_LOG").ok().and_then(|s| s.parse().ok()).unwrap_or(default);

	log::set_max_level(level);

	// Only the first call in a process should install the logger; binaries call this once at
	// startup, but tests may construct multiple sessions in one process.
	let _ = log::set_boxed_logger(Box::new(logger::Logger));
}

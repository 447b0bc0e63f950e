use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reads a file in fixed-size chunks matching the negotiated buffer size, reporting whether
/// each chunk is the last one so the caller can flag the corresponding packet as EOF.
pub struct FileReader {
	file: File,
	chunk_size: usize,
}

impl FileReader {
	pub fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
		Ok(Self { file: File::open(path)?, chunk_size })
	}

	/// Read up to `chunk_size` bytes. `is_eof` is true iff this chunk reaches the end of the
	/// file: either it came back short, or a full-size read landed exactly on the boundary,
	/// which is checked by peeking one more byte and seeking back if one was found.
	pub fn read_chunk(&mut self) -> io::Result<(Vec<u8>, bool)> {
		let mut buf = vec![0u8; self.chunk_size];
		let mut filled = 0;

		while filled < buf.len() {
			let n = self.file.read(&mut buf[filled..])?;
			if n == 0 {
				break;
			}
			filled += n;
		}

		buf.truncate(filled);

		let is_eof = filled < self.chunk_size || self.peek_is_eof()?;
		Ok((buf, is_eof))
	}

	fn peek_is_eof(&mut self) -> io::Result<bool> {
		let mut probe = [0u8; 1];
		let n = self.file.read(&mut probe)?;
		if n == 0 {
			return Ok(true);
		}
		self.file.seek(SeekFrom::Current(-1))?;
		Ok(false)
	}
}

/// Writes chunks to a file in the order they arrive; the receiver only ever calls
/// [`FileWriter::write_chunk`] with in-order data, so no seeking is needed.
pub struct FileWriter {
	file: File,
}

impl FileWriter {
	pub fn create(path: &Path) -> io::Result<Self> {
		Ok(Self { file: File::create(path)? })
	}

	pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
		self.file.write_all(data)
	}
}

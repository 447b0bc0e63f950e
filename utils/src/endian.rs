use crate::bytes::{Cast, Unaligned};

macro_rules! define_be {
	( $( $name:ident($int:ident, $n:literal) )* ) => {
		$(
			#[doc = concat!("A ", stringify!($int), " represented in bytes in big-endian byteorder.")]
			#[derive(Clone, Copy, Default, PartialEq, Eq)]
			#[repr(transparent)]
			#[allow(non_camel_case_types)]
			pub struct $name([u8; $n]);

			impl $name {
				/// Retrieves a copy of the value being represented in native-endian, swapping
				/// bytes if needed.
				#[inline(always)]
				pub fn get(self) -> $int {
					$int::from_be_bytes(self.0)
				}
			}

			impl From<$int> for $name {
				/// Converts the value to big-endian byte representation.
				#[inline(always)]
				fn from(value: $int) -> Self {
					Self(value.to_be_bytes())
				}
			}

			impl core::fmt::Debug for $name {
				fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
					core::fmt::Debug::fmt(&self.get(), f)
				}
			}

			unsafe impl Cast for $name {}
			unsafe impl Unaligned for $name {}
		)*
	};
}

define_be!(u16be(u16, 2) u32be(u32, 4));

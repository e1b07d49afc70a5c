use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
	Write,
	Read,
}

impl Direction {
	pub fn bit(self) -> u8 {
		match self {
			Direction::Write => 0,
			Direction::Read => 1,
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Direction::Write => f.write_str("W"),
			Direction::Read => f.write_str("R"),
		}
	}
}

/// 7-bit slave address, kept in its shifted "control byte" form
/// (direction bit always zero)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveAddress(u8);

impl SlaveAddress {
	pub const fn new(address: u8) -> Self {
		SlaveAddress((address & 0x7f) << 1)
	}

	pub const fn from_control_byte(control: u8) -> Self {
		SlaveAddress(control & 0xfe)
	}

	pub fn seven_bit(self) -> u8 {
		self.0 >> 1
	}

	pub fn control_byte(self) -> u8 {
		self.0
	}

	/// SLA+R/W byte put on the bus during the address phase
	pub fn frame(self, direction: Direction) -> u8 {
		(self.0 & 0xfe) | direction.bit()
	}
}

impl fmt::Display for SlaveAddress {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.seven_bit())
	}
}

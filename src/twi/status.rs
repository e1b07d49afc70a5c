use std::borrow::Cow;
use std::fmt;

use super::registers::STATUS_CODE_MASK;

/// Phase code from the status register (prescaler bits masked off)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusStatus {
	Start,
	RepeatedStart,
	ArbitrationLostOrNak,
	// master transmit
	WriteAddressAck,
	WriteAddressNak,
	WriteDataAck,
	WriteDataNak,
	// master receive
	ReadAddressAck,
	ReadAddressNak,
	ReadDataAck,
	ReadDataNak,
	Unknown(u8),
}

impl BusStatus {
	pub fn from_register(value: u8) -> Self {
		match value & STATUS_CODE_MASK {
			0x08 => BusStatus::Start,
			0x10 => BusStatus::RepeatedStart,
			0x38 => BusStatus::ArbitrationLostOrNak,
			0x18 => BusStatus::WriteAddressAck,
			0x20 => BusStatus::WriteAddressNak,
			0x28 => BusStatus::WriteDataAck,
			0x30 => BusStatus::WriteDataNak,
			0x40 => BusStatus::ReadAddressAck,
			0x48 => BusStatus::ReadAddressNak,
			0x50 => BusStatus::ReadDataAck,
			0x58 => BusStatus::ReadDataNak,
			raw => BusStatus::Unknown(raw),
		}
	}

	pub fn code(self) -> u8 {
		match self {
			BusStatus::Start => 0x08,
			BusStatus::RepeatedStart => 0x10,
			BusStatus::ArbitrationLostOrNak => 0x38,
			BusStatus::WriteAddressAck => 0x18,
			BusStatus::WriteAddressNak => 0x20,
			BusStatus::WriteDataAck => 0x28,
			BusStatus::WriteDataNak => 0x30,
			BusStatus::ReadAddressAck => 0x40,
			BusStatus::ReadAddressNak => 0x48,
			BusStatus::ReadDataAck => 0x50,
			BusStatus::ReadDataNak => 0x58,
			BusStatus::Unknown(raw) => raw,
		}
	}

	/// Whether the last transmitted frame was acknowledged (or, after a
	/// receive, whether the master acknowledged the byte)
	pub fn is_ack(self) -> bool {
		match self {
			BusStatus::WriteAddressAck
			| BusStatus::WriteDataAck
			| BusStatus::ReadAddressAck
			| BusStatus::ReadDataAck => true,
			_ => false,
		}
	}
}

/// Human readable name of the transaction phase a status code stands for
pub fn describe(status: BusStatus) -> Cow<'static, str> {
	match status {
		BusStatus::Start => "START".into(),
		BusStatus::RepeatedStart => "RESTART".into(),
		BusStatus::ArbitrationLostOrNak => "NOARB/NAK".into(),
		BusStatus::WriteAddressAck => "MT SLA+W, ACK".into(),
		BusStatus::WriteAddressNak => "MT SLA+W, NAK".into(),
		BusStatus::WriteDataAck => "MT DATA+W, ACK".into(),
		BusStatus::WriteDataNak => "MT DATA+W, NAK".into(),
		BusStatus::ReadAddressAck => "MR SLA+R, ACK".into(),
		BusStatus::ReadAddressNak => "MR SLA+R, NAK".into(),
		BusStatus::ReadDataAck => "MR DATA+R, ACK".into(),
		BusStatus::ReadDataNak => "MR DATA+R, NAK".into(),
		BusStatus::Unknown(raw) => format!("unknown, raw=0x{:02X}", raw).into(),
	}
}

impl fmt::Display for BusStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&describe(*self))
	}
}

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
	BitRate, // "TWBR"
	Status,  // "TWSR"
	Data,    // "TWDR"
	Control, // "TWCR"
}

impl Register {
	/// Byte offset relative to the bit rate register
	pub fn offset(self) -> usize {
		match self {
			Register::BitRate => 0,
			Register::Status => 1,
			// +2 is the (unused) slave address register
			Register::Data => 3,
			Register::Control => 4,
		}
	}
}

// control register flags
pub const CONTROL_INTERRUPT:  u8 = 0x80; // set by hardware; write 1 to clear and launch the next phase
pub const CONTROL_ACK_ENABLE: u8 = 0x40;
pub const CONTROL_START:      u8 = 0x20;
pub const CONTROL_STOP:       u8 = 0x10; // cleared by hardware once STOP was generated
pub const CONTROL_ENABLE:     u8 = 0x04;

// status register
pub const STATUS_CODE_MASK:      u8 = 0xf8;
pub const STATUS_PRESCALER_MASK: u8 = 0x03;

/// Access to the TWI peripheral registers.
///
/// Whoever holds the value owns the bus; `I2cMaster` takes it by value.
pub trait BusRegisters {
	fn read(&self, register: Register) -> u8;
	fn write(&mut self, register: Register, value: u8);

	// called between two polls of a busy-wait
	fn relax(&mut self) {
	}
}

impl<'a, R: ?Sized + BusRegisters> BusRegisters for &'a mut R {
	fn read(&self, register: Register) -> u8 {
		R::read(*self, register)
	}
	fn write(&mut self, register: Register, value: u8) {
		R::write(*self, register, value);
	}
	fn relax(&mut self) {
		R::relax(*self);
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlRead(pub u8);

impl ControlRead {
	pub fn is_interrupt(&self) -> bool {
		0 != self.0 & CONTROL_INTERRUPT
	}
	pub fn is_ack_enable(&self) -> bool {
		0 != self.0 & CONTROL_ACK_ENABLE
	}
	pub fn is_start(&self) -> bool {
		0 != self.0 & CONTROL_START
	}
	pub fn is_stop(&self) -> bool {
		0 != self.0 & CONTROL_STOP
	}
	pub fn is_enabled(&self) -> bool {
		0 != self.0 & CONTROL_ENABLE
	}
}

impl fmt::Debug for ControlRead {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x} (", self.0)?;
		if self.is_interrupt() { write!(f, " [INT]")?; }
		if self.is_ack_enable() { write!(f, " [EA]")?; }
		if self.is_start() { write!(f, " [STA]")?; }
		if self.is_stop() { write!(f, " [STO]")?; }
		if self.is_enabled() { write!(f, " [EN]")?; }
		write!(f, " )")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlWrite(pub u8);

impl ControlWrite {
	pub fn enable() -> Self {
		ControlWrite(CONTROL_ENABLE)
	}

	// clear the interrupt flag, which launches the next bus phase
	pub fn proceed() -> Self {
		ControlWrite(CONTROL_INTERRUPT | CONTROL_ENABLE)
	}

	pub fn start() -> Self {
		*Self::proceed().set(CONTROL_START)
	}

	pub fn stop() -> Self {
		*Self::proceed().set(CONTROL_STOP)
	}

	pub fn receive(ack: bool) -> Self {
		let mut control = Self::proceed();
		if ack {
			control.set(CONTROL_ACK_ENABLE);
		}
		control
	}

	fn set(&mut self, flag: u8) -> &mut Self {
		self.0 |= flag;
		self
	}
}

impl fmt::Debug for ControlWrite {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(&ControlRead(self.0), f)
	}
}

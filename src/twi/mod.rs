//! Single-master driver for an AVR-style TWI ("two-wire interface", I²C)
//! peripheral.
//!
//! Registers:
//! - control: interrupt flag (0x80), ack enable (0x40), START (0x20),
//!   STOP (0x10), enable (0x04)
//! - status: phase code in the top 5 bits, prescaler in the low 2 bits
//! - data: byte to transmit / byte received
//! - bit rate: SCL = source / (16 + 2 * divider * prescaler)
//!
//! Every phase is launched by writing the control register with the
//! interrupt flag set (which clears it), and completes when the hardware
//! sets the flag again; STOP instead completes by clearing its own bit.
//!
//! Transaction: START, SLA+R/W, data phases, STOP; a repeated START may
//! switch direction in between.

pub mod clock;
pub mod mapped;
pub mod registers;

mod address;
mod error;
mod master;
mod status;
mod wait;

pub use self::address::{
	Direction,
	SlaveAddress,
};

pub use self::error::BusError;

pub use self::master::{
	BusState,
	I2cMaster,
	MasterConfig,
	Phase,
	Transaction,
};

pub use self::registers::{
	BusRegisters,
	Register,
};

pub use self::status::{
	BusStatus,
	describe,
};

pub use self::wait::{
	Deadline,
	WaitLimit,
};

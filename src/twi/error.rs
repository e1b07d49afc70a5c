use failure::Fail;

use super::master::{
	BusState,
	Phase,
};
use super::status::BusStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Fail)]
pub enum BusError {
	#[fail(display = "TWI peripheral not initialized")]
	NotInitialized,
	#[fail(display = "{} not allowed in bus state {:?}", phase, state)]
	InvalidState { phase: Phase, state: BusState },
	#[fail(display = "arbitration lost during {}", phase)]
	ArbitrationLost { phase: Phase },
	#[fail(display = "unexpected status after {}: {}", phase, status)]
	UnexpectedStatus { phase: Phase, status: BusStatus },
	#[fail(display = "timeout waiting for {}", phase)]
	Timeout { phase: Phase },
	#[fail(display = "{} not acknowledged ({})", phase, status)]
	Nak { phase: Phase, status: BusStatus },
}

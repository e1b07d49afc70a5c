// SCL = source / (16 + 2 * divider * prescaler)

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Prescaler {
	One,
	Four,
	Sixteen,
	SixtyFour,
}

impl Prescaler {
	pub const ALL: [Prescaler; 4] = [Prescaler::One, Prescaler::Four, Prescaler::Sixteen, Prescaler::SixtyFour];

	pub fn factor(self) -> u32 {
		match self {
			Prescaler::One => 1,
			Prescaler::Four => 4,
			Prescaler::Sixteen => 16,
			Prescaler::SixtyFour => 64,
		}
	}

	// value of the status register prescaler bits
	pub fn bits(self) -> u8 {
		match self {
			Prescaler::One => 0,
			Prescaler::Four => 1,
			Prescaler::Sixteen => 2,
			Prescaler::SixtyFour => 3,
		}
	}

	pub fn from_bits(bits: u8) -> Self {
		match bits & 0x3 {
			0 => Prescaler::One,
			1 => Prescaler::Four,
			2 => Prescaler::Sixteen,
			3 => Prescaler::SixtyFour,
			_ => unreachable!(),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitRate {
	pub divider: u8,
	pub prescaler: Prescaler,
}

impl BitRate {
	/// Closest setting not faster than `target_hz`, if one exists.
	///
	/// Returns `None` if the target is outside what the divider can
	/// express for `source_hz`.
	pub fn for_frequency(source_hz: u32, target_hz: u32) -> Option<Self> {
		if target_hz == 0 || target_hz > source_hz / 16 {
			return None;
		}
		let target = u64::from(target_hz);
		let cycles = (u64::from(source_hz) + target - 1) / target;
		// cycles >= 16 here
		let steps = (cycles - 16 + 1) / 2;
		for prescaler in Prescaler::ALL.iter() {
			let factor = u64::from(prescaler.factor());
			let divider = (steps + factor - 1) / factor;
			if divider <= 0xff {
				return Some(BitRate {
					divider: divider as u8,
					prescaler: *prescaler,
				});
			}
		}
		None
	}

	/// Like `for_frequency`, but clamps unreachable targets to the
	/// fastest/slowest available setting.
	pub fn clamped(source_hz: u32, target_hz: u32) -> Self {
		if let Some(rate) = Self::for_frequency(source_hz, target_hz) {
			return rate;
		}
		if target_hz != 0 && target_hz > source_hz / 16 {
			BitRate {
				divider: 0,
				prescaler: Prescaler::One,
			}
		} else {
			BitRate {
				divider: 0xff,
				prescaler: Prescaler::SixtyFour,
			}
		}
	}

	pub fn scl_frequency(&self, source_hz: u32) -> u32 {
		source_hz / (16 + 2 * u32::from(self.divider) * self.prescaler.factor())
	}
}

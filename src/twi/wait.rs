use std::time::{
	Duration,
	Instant,
};

use super::registers::BusRegisters;

/// Bound for a busy-wait or retry loop
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitLimit {
	/// never give up (hangs on unresponsive hardware)
	Forever,
	/// give up after this many unsuccessful polls
	Polls(u32),
	/// give up once this much time has passed
	Time(Duration),
}

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
	limit: WaitLimit,
	polls: u32,
	started: Instant,
}

impl Deadline {
	pub fn new(limit: WaitLimit) -> Self {
		Deadline {
			limit,
			polls: 0,
			started: Instant::now(),
		}
	}

	pub fn polls(&self) -> u32 {
		self.polls
	}

	/// Account for one more unsuccessful poll; true if the limit is reached
	pub fn expired(&mut self) -> bool {
		self.polls = self.polls.saturating_add(1);
		match self.limit {
			WaitLimit::Forever => false,
			WaitLimit::Polls(max) => self.polls >= max,
			WaitLimit::Time(max) => self.started.elapsed() >= max,
		}
	}
}

/// Poll `done` until it returns true; `registers.relax()` runs between
/// polls. Returns false if the limit was reached first.
pub fn wait_until<R, F>(registers: &mut R, limit: WaitLimit, mut done: F) -> bool
where
	R: BusRegisters + ?Sized,
	F: FnMut(&R) -> bool,
{
	let mut deadline = Deadline::new(limit);
	loop {
		if done(&*registers) {
			return true;
		}
		if deadline.expired() {
			return false;
		}
		registers.relax();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn poll_limit_counts_failures() {
		let mut deadline = Deadline::new(WaitLimit::Polls(3));
		assert!(!deadline.expired());
		assert!(!deadline.expired());
		assert!(deadline.expired());
		assert_eq!(deadline.polls(), 3);
	}

	#[test]
	fn forever_never_expires() {
		let mut deadline = Deadline::new(WaitLimit::Forever);
		for _ in 0..10_000 {
			assert!(!deadline.expired());
		}
	}

	#[test]
	fn zero_time_expires_immediately() {
		let mut deadline = Deadline::new(WaitLimit::Time(Duration::from_secs(0)));
		assert!(deadline.expired());
	}
}

// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! Gameboy's joypad controller.

use super::Memory;

use crate::GameboyError;
use crate::cpu::interrupts::*;

pub mod consts {
	use super::*;

	pub const IO_P1: u16 = 0xFF00;
}

use consts::*;

/// The matrix layout for the P1 register, according to the Gameboy CPU manual.
pub enum Key {
	Right,
	Left,
	Up,
	Down,
	A,
	B,
	Select,
	Start,
}

impl Key {
	pub fn value(&self) -> u8 {
		match self {
			Key::Right => 1,
			Key::Left => 2,
			Key::Up => 4,
			Key::Down => 8,
			Key::A => 16,
			Key::B => 32,
			Key::Select => 64,
			Key::Start => 128,
		}
	}
}

pub trait Controller {
	/// Mark the given key as currently pressed.
	fn down(&mut self, key: Key);

	/// Mark the given key as released.
	fn up(&mut self, key: Key);
}

/// Joypad lines are active-low: a cleared bit in `lines` means the
/// corresponding key is held down. The lower nibble is the direction pad
/// (Right/Left/Up/Down), the upper nibble is the face buttons
/// (A/B/Select/Start).
pub struct Joypad {
	lines: u8,
	/// The last value written to P1: bits 4-5 select which nibble of `lines`
	/// is visible through the register.
	select: u8,
	/// The visible nibble as of the last recomputation, used to detect the
	/// 1->0 transition that requests a Joypad interrupt.
	prev_visible: u8,
	interrupt_flag: InterruptMask,
}

impl Joypad {
	/// Initialize a new timer instance.
	pub fn new() -> Self {
		let mut joypad = Joypad {
			lines: 0xFF,
			select: 0x30,
			prev_visible: 0xF,
			interrupt_flag: 0,
		};

		joypad.prev_visible = joypad.visible_nibble();

		joypad
	}

	/// Update the joypad's state according to the elapsed time.
	pub fn process(&mut self, _cycles: usize) {}

	/// The nibble currently selected by `select`, combining both rows when
	/// both are selected (matches real hardware's wired-AND behavior).
	fn visible_nibble(&self) -> u8 {
		let buttons_selected = self.select & 0x20 == 0;
		let direction_selected = self.select & 0x10 == 0;

		match (buttons_selected, direction_selected) {
			(true, true) => (self.lines >> 4) & (self.lines & 0xF),
			(true, false) => (self.lines >> 4) & 0xF,
			(false, true) => self.lines & 0xF,
			(false, false) => 0xF,
		}
	}

	/// Only a genuine 1->0 transition on the currently visible nibble
	/// requests an interrupt; level alone (e.g. a key already held when its
	/// row gets selected) must not.
	fn update_interrupt(&mut self) {
		let cur = self.visible_nibble();

		if self.prev_visible & !cur != 0 {
			self.interrupt_flag |= Interrupt::Joypad.value();
		}

		self.prev_visible = cur;
	}
}

impl Controller for Joypad {
	fn down(&mut self, key: Key) {
		self.lines &= !key.value();
		self.update_interrupt();
	}

	fn up(&mut self, key: Key) {
		self.lines |= key.value();
		self.update_interrupt();
	}
}

impl InterruptSource for Joypad {
	fn interrupts(&self) -> InterruptMask {
		self.interrupt_flag
	}

	fn clear(&mut self) {
		self.interrupt_flag = 0;
	}
}

impl Memory for Joypad {
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		if address != IO_P1 {
			return Err(GameboyError::BadAddress(address));
		}

		self.select = value & 0x30;
		self.update_interrupt();

		Ok(())
	}

	fn read(&self, address: u16) -> Result<u8, GameboyError> {
		if address != IO_P1 {
			return Err(GameboyError::BadAddress(address));
		}

		Ok(0xC0 | self.select | self.visible_nibble())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_released_reads_as_all_ones() {
		let mut joypad = Joypad::new();
		joypad.write(IO_P1, 0x10).unwrap(); // select direction row
		assert_eq!(joypad.read(IO_P1).unwrap() & 0xF, 0xF);
	}

	#[test]
	fn test_press_on_selected_row_requests_interrupt() {
		let mut joypad = Joypad::new();
		joypad.write(IO_P1, 0x10).unwrap(); // select direction row
		joypad.clear();

		joypad.down(Key::Up);

		assert_eq!(joypad.interrupts(), Interrupt::Joypad.value());
		assert_eq!(joypad.read(IO_P1).unwrap() & 0xF, 0xF & !Key::Up.value());
	}

	#[test]
	fn test_press_on_unselected_row_does_not_interrupt() {
		let mut joypad = Joypad::new();
		joypad.write(IO_P1, 0x20).unwrap(); // select buttons row only
		joypad.clear();

		joypad.down(Key::Up); // direction key, not visible right now

		assert_eq!(joypad.interrupts(), 0);
	}

	#[test]
	fn test_selecting_a_row_with_an_already_held_key_interrupts_once() {
		let mut joypad = Joypad::new();
		joypad.write(IO_P1, 0x20).unwrap(); // select buttons row, direction held below is invisible
		joypad.down(Key::Up);
		joypad.clear();

		// Selecting the direction row exposes the already-pressed key: this
		// is a 1->0 transition on the newly visible nibble.
		joypad.write(IO_P1, 0x10).unwrap();
		assert_eq!(joypad.interrupts(), Interrupt::Joypad.value());
	}
}

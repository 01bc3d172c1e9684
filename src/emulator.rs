// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! The emulation library's front-end API: the host-facing hooks a frontend
//! drives the core through (loading a cartridge is the caller's job, via
//! [`crate::bus::cartridge::Cartridge::new`]; this module wraps the
//! resulting [`Cpu`] with frame stepping, button input and framebuffer
//! export).

use crate::GameboyError;
use crate::bus::joypad::{Controller, Key};
use crate::bus::ppu::PpuMode;
use crate::bus::cartridge::Cartridge;
use crate::config::Config;
use crate::cpu::Cpu;

/// A snapshot of which of the eight logical buttons are currently held.
/// Latch a new snapshot with [`Emulator::set_buttons`] before calling
/// [`Emulator::step_frame`].
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Buttons {
	#[allow(missing_docs)]
	pub right: bool,
	#[allow(missing_docs)]
	pub left: bool,
	#[allow(missing_docs)]
	pub up: bool,
	#[allow(missing_docs)]
	pub down: bool,
	#[allow(missing_docs)]
	pub a: bool,
	#[allow(missing_docs)]
	pub b: bool,
	#[allow(missing_docs)]
	pub select: bool,
	#[allow(missing_docs)]
	pub start: bool,
}

/// The complete emulator's state.
pub struct Emulator<'a> {
	/// The gameboy's processor (and, transitively, its memory bus).
	pub cpu: Cpu<'a>,
	buttons: Buttons,
}

impl<'a> Emulator<'a> {
	/// Create a new emulator around an already-loaded cartridge.
	#[inline(always)]
	pub fn new(config: &'a Config, cartridge: &'a mut Cartridge<'a>) -> Self {
		Emulator {
			cpu: Cpu::new(config, cartridge),
			buttons: Buttons::default(),
		}
	}

	/// Run instructions until the PPU enters VBlank for the next time.
	pub fn step_frame(&mut self) -> Result<(), GameboyError> {
		let mut was_vblank = self.cpu.mmap.ppu.mode() == PpuMode::Vblank;

		loop {
			self.cpu.execute()?;

			let is_vblank = self.cpu.mmap.ppu.mode() == PpuMode::Vblank;
			if is_vblank && !was_vblank {
				break;
			}
			was_vblank = is_vblank;
		}

		Ok(())
	}

	/// Latch the given button state; only edges against the previous
	/// snapshot are forwarded to the joypad, so the edge-triggered
	/// interrupt logic there sees genuine transitions.
	pub fn set_buttons(&mut self, buttons: Buttons) {
		macro_rules! apply {
			($field:ident, $key:expr) => {
				if buttons.$field != self.buttons.$field {
					let pressed = buttons.$field;
					self.cpu.with_controller(|controller| {
						if pressed {
							controller.down($key);
						} else {
							controller.up($key);
						}
					});
				}
			};
		}

		apply!(right, Key::Right);
		apply!(left, Key::Left);
		apply!(up, Key::Up);
		apply!(down, Key::Down);
		apply!(a, Key::A);
		apply!(b, Key::B);
		apply!(select, Key::Select);
		apply!(start, Key::Start);

		self.buttons = buttons;
	}

	/// The rendered grayscale framebuffer, row-major with row 0 at the top.
	pub fn framebuffer(&self) -> &[u8] {
		self.cpu.framebuffer()
	}
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
	use super::*;
	use crate::bus::cartridge::CartridgeType;

	#[test]
	fn test_step_frame_runs_until_vblank_and_exports_a_full_framebuffer() -> Result<(), GameboyError> {
		let config = Config::default();
		let mut rom = crate::bus::cartridge::tests::empty_rom(CartridgeType::RomOnly);

		// At the reset vector (0x0100, where CpuState starts PC): turn the
		// display on, then spin forever. step_frame must still return once
		// VBlank is reached rather than looping past it.
		rom[0x0100] = 0x3E; // LD A, 0x91
		rom[0x0101] = 0x91;
		rom[0x0102] = 0xE0; // LDH (FF40), A
		rom[0x0103] = 0x40;
		rom[0x0104] = 0x18; // JR -2 (spin forever)
		rom[0x0105] = 0xFE;

		let mut ram = Cartridge::make_ram(&rom)?;
		let mut cartridge = Cartridge::new(&mut rom, &mut ram)?;
		let mut emulator = Emulator::new(&config, &mut cartridge);

		emulator.step_frame()?;

		assert_eq!(emulator.framebuffer().len(), 160 * 144);
		assert!(matches!(emulator.cpu.mmap.ppu.mode(), PpuMode::Vblank));

		Ok(())
	}

	#[test]
	fn test_set_buttons_only_forwards_edges() -> Result<(), GameboyError> {
		let config = Config::default();
		let mut rom = crate::bus::cartridge::tests::empty_rom(CartridgeType::RomOnly);
		let mut ram = Cartridge::make_ram(&rom)?;
		let mut cartridge = Cartridge::new(&mut rom, &mut ram)?;
		let mut emulator = Emulator::new(&config, &mut cartridge);

		// Select the buttons row so A's press is actually visible.
		emulator.cpu.mmap.write(0xFF00, 0x10)?;

		let mut pressed = Buttons::default();
		pressed.a = true;
		emulator.set_buttons(pressed);
		assert_ne!(emulator.cpu.mmap.joypad.interrupts(), 0);

		use crate::cpu::interrupts::InterruptSource;
		emulator.cpu.mmap.joypad.clear();

		// Re-latching the same snapshot must not re-trigger the edge.
		emulator.set_buttons(pressed);
		assert_eq!(emulator.cpu.mmap.joypad.interrupts(), 0);

		Ok(())
	}
}

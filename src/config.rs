// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Emulator hardware emulation configuration and preferences.

#[cfg(feature = "alloc")]
use serde::{Deserialize, Serialize};

/// The hardware specification for the different models differ.
///
/// Only [`HardwareModel::GB`] is behaviorally wired into the core: the other
/// variants exist because post-boot register state is genuinely
/// model-dependent (see [`HardwareModel::boot_a_register`]), but CGB
/// double-speed mode, CGB palettes and SGB packet handling are out of scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "alloc", derive(Serialize, Deserialize))]
pub enum HardwareModel {
	/// Original GameBoy
	GB,
	/// Gameboy Color
	GBC,
	/// GameBoy Pocket (not intended to be supported soon)
	GBP,
	/// Super GameBoy (not intended to be supported soon)
	SGB,
}

impl HardwareModel {
	/// The value register A holds immediately after the boot ROM hands off,
	/// per model. Boot-ROM emulation itself is out of scope: the core
	/// initializes directly to post-boot values.
	pub fn boot_a_register(self) -> u8 {
		match self {
			HardwareModel::GB => 0x01,
			HardwareModel::GBP => 0xff,
			HardwareModel::GBC => 0x11,
			HardwareModel::SGB => 0x01,
		}
	}

	/// The 16-bit value the internal DIV counter holds immediately after
	/// the boot ROM hands off, per model.
	pub fn boot_div(self) -> u16 {
		match self {
			HardwareModel::GB | HardwareModel::SGB => 0xabcc,
			HardwareModel::GBC => 0x1ea0,
			HardwareModel::GBP => 0x1ea4,
		}
	}
}

impl Default for HardwareModel {
	fn default() -> Self {
		HardwareModel::GB
	}
}

/// Emulation settings and preferences goes here.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "alloc", derive(Serialize, Deserialize))]
pub struct Config {
	/// The model of the emulated machine
	pub model: HardwareModel,
}

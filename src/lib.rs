// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]
//! This library provides emulation of the Game Boy's Sharp SM83 CPU and its
//! peripherals (MMU/MBC, PPU, timer, OAM-DMA), as described in the publicly
//! available "Game Boy CPU Manual" and Pan Docs.

#[cfg(any(test, feature = "debug"))]
#[macro_use]
extern crate std;
extern crate core;
// The alloc crate is optional, and used for allocating the cartridge controller's
// ram on the heap.
#[cfg(feature = "alloc")]
extern crate alloc;

pub mod bus;
pub mod config;
pub mod cpu;
pub mod emulator;

use core::fmt;

/// The library's exported errors.
pub enum GameboyError {
	/// Unimplemented feature error.
	NotImplemented,
	/// Cartridge operation error.
	Cartridge(&'static str),
	/// Generic IO related error.
	Io(&'static str),
	/// Unexpected address error.
	BadAddress(u16),
	/// Invalid opcode error.
	BadOpcode(u8),
	/// Invalid value written to a register.
	BadValue(u8),
	/// The ROM image is smaller than the minimum cartridge size (32 KiB).
	RomTooSmall(usize),
	/// Byte `0x0147` named a cartridge type this core does not emulate.
	UnsupportedCartridgeType(u8),
	/// Byte `0x0148` held a ROM size code outside the known table.
	BadRomSizeCode(u8),
	/// Byte `0x0149` held a RAM size code outside the known table.
	BadRamSizeCode(u8),
	/// A save file's length did not match the cartridge's declared RAM size.
	SaveSizeMismatch {
		/// The size, in bytes, the cartridge's header declares.
		expected: usize,
		/// The size, in bytes, of the save data actually supplied.
		found: usize,
	},
}

impl fmt::Display for GameboyError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			GameboyError::NotImplemented => write!(f, "Not implemented"),
            GameboyError::Cartridge(ref info) => write!(f, "Cartridge error: {}", info),
            GameboyError::Io(ref info) => write!(f, "IO error: {}", info),
            GameboyError::BadAddress(address) => write!(f, "Bad address: 0x{:x}", address),
            GameboyError::BadOpcode(value) => write!(f, "Bad opcode: 0x{:x}", value),
            GameboyError::BadValue(value) => write!(f, "Bad value: {}", value),
            GameboyError::RomTooSmall(len) => write!(f, "ROM too small: {} bytes", len),
            GameboyError::UnsupportedCartridgeType(code) => {
                write!(f, "Unsupported cartridge type: 0x{:x}", code)
            }
            GameboyError::BadRomSizeCode(code) => write!(f, "Bad ROM size code: 0x{:x}", code),
            GameboyError::BadRamSizeCode(code) => write!(f, "Bad RAM size code: 0x{:x}", code),
            GameboyError::SaveSizeMismatch { expected, found } => write!(
                f,
                "Save file size mismatch: expected {} bytes, found {}",
                expected, found
            ),
        }
	}
}

impl fmt::Debug for GameboyError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		(self as &dyn fmt::Display).fmt(f)
	}
}

/// A `Result` whose error type is always [`GameboyError`].
pub type GameboyResult<T> = Result<T, GameboyError>;

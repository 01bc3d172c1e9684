// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Gameboy cpu's arithmetic and logic unit.
//!
//! Every function here is a pure transform over the register file: it reads
//! whatever operands it needs, writes the result plus the four flags, and
//! returns the result. None of them touch the bus or cost cycles; that
//! bookkeeping belongs to the instruction that calls them.

use super::Cpu;
use super::instructions::InsnResult;
use super::state::registers::{Flag, Register};
use super::state::CpuState;

fn set_zn_h_c(state: &mut CpuState, result: u8, n: bool, h: bool, c: bool) {
	state.set_flag(Flag::Z, result == 0);
	state.set_flag(Flag::N, n);
	state.set_flag(Flag::H, h);
	state.set_flag(Flag::C, c);
}

/// Implementation of 8-bit arithmetic and logic operations.
pub mod alu8 {
	use super::*;

	/// `ADD a,b`: adds the given arguments, sets the relevant flags and
	/// returns the result.
	pub fn add(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let result = lhs.wrapping_add(rhs);
		let half_carry = (lhs & 0xF) + (rhs & 0xF) > 0xF;
		let carry = (lhs as u16) + (rhs as u16) > 0xFF;
		set_zn_h_c(state, result, false, half_carry, carry);
		result
	}

	/// `ADC a,b`: adds the given arguments plus the carry flag.
	pub fn adc(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let carry_in = state.get_flag(Flag::C) as u8;
		let result = lhs.wrapping_add(rhs).wrapping_add(carry_in);
		let half_carry = (lhs & 0xF) + (rhs & 0xF) + carry_in > 0xF;
		let carry = (lhs as u16) + (rhs as u16) + (carry_in as u16) > 0xFF;
		set_zn_h_c(state, result, false, half_carry, carry);
		result
	}

	/// `SUB a,b`.
	pub fn sub(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let result = lhs.wrapping_sub(rhs);
		let half_carry = (lhs & 0xF) < (rhs & 0xF);
		let carry = lhs < rhs;
		set_zn_h_c(state, result, true, half_carry, carry);
		result
	}

	/// `SBC a,b`: subtracts the given arguments plus the carry flag.
	pub fn sbc(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let carry_in = state.get_flag(Flag::C) as u8;
		let result = lhs.wrapping_sub(rhs).wrapping_sub(carry_in);
		let half_carry = (lhs & 0xF) < (rhs & 0xF) + carry_in;
		let carry = (lhs as u16) < (rhs as u16) + (carry_in as u16);
		set_zn_h_c(state, result, true, half_carry, carry);
		result
	}

	/// `AND a,b`.
	pub fn and(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let result = lhs & rhs;
		set_zn_h_c(state, result, false, true, false);
		result
	}

	/// `XOR a,b`.
	pub fn xor(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let result = lhs ^ rhs;
		set_zn_h_c(state, result, false, false, false);
		result
	}

	/// `OR a,b`.
	pub fn or(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		let result = lhs | rhs;
		set_zn_h_c(state, result, false, false, false);
		result
	}

	/// `CP a,b`: same flags as `SUB`. Returns `lhs` unchanged so that it can
	/// share [`op_registers`]/[`op_mem`]/[`op_imm`]'s write-back signature
	/// without actually touching `A`.
	pub fn cp(state: &mut CpuState, lhs: u8, rhs: u8) -> u8 {
		sub(state, lhs, rhs);
		lhs
	}

	/// `INC r8` / `INC (HL)`.
	pub fn inc(state: &mut CpuState, value: u8) -> u8 {
		let result = value.wrapping_add(1);
		let half_carry = (value & 0xF) + 1 > 0xF;
		state.set_flag(Flag::Z, result == 0);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, half_carry);
		result
	}

	/// `DEC r8` / `DEC (HL)`.
	pub fn dec(state: &mut CpuState, value: u8) -> u8 {
		let result = value.wrapping_sub(1);
		let half_carry = value & 0xF == 0;
		state.set_flag(Flag::Z, result == 0);
		state.set_flag(Flag::N, true);
		state.set_flag(Flag::H, half_carry);
		result
	}

	/// `DAA`: decimal-adjusts A after a BCD addition or subtraction,
	/// consulting N/H/C from the previous operation.
	pub fn daa(state: &mut CpuState, value: u8) -> u8 {
		let n = state.get_flag(Flag::N);
		let mut carry = state.get_flag(Flag::C);
		let half_carry = state.get_flag(Flag::H);
		let mut result = value;

		if !n {
			if carry || result > 0x99 {
				result = result.wrapping_add(0x60);
				carry = true;
			}
			if half_carry || (result & 0x0F) > 0x09 {
				result = result.wrapping_add(0x06);
			}
		} else {
			if carry {
				result = result.wrapping_sub(0x60);
			}
			if half_carry {
				result = result.wrapping_sub(0x06);
			}
		}

		state.set_flag(Flag::Z, result == 0);
		state.set_flag(Flag::H, false);
		state.set_flag(Flag::C, carry);
		result
	}

	/// `CPL`: bitwise-complements A.
	pub fn cpl(state: &mut CpuState, value: u8) -> u8 {
		state.set_flag(Flag::N, true);
		state.set_flag(Flag::H, true);
		!value
	}

	/// `RLCA`/`RLC r`: rotate left, bit 7 into carry and into bit 0.
	pub fn rlc(state: &mut CpuState, value: u8, z_is_cleared: bool) -> u8 {
		let carry = (value & 0x80) != 0;
		let result = value.rotate_left(1);
		state.set_flag(Flag::Z, !z_is_cleared && result == 0);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, false);
		state.set_flag(Flag::C, carry);
		result
	}

	/// `RRCA`/`RRC r`: rotate right, bit 0 into carry and into bit 7.
	pub fn rrc(state: &mut CpuState, value: u8, z_is_cleared: bool) -> u8 {
		let carry = (value & 0x01) != 0;
		let result = value.rotate_right(1);
		state.set_flag(Flag::Z, !z_is_cleared && result == 0);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, false);
		state.set_flag(Flag::C, carry);
		result
	}

	/// `RLA`/`RL r`: rotate left through carry.
	pub fn rl(state: &mut CpuState, value: u8, z_is_cleared: bool) -> u8 {
		let carry_in = state.get_flag(Flag::C) as u8;
		let carry_out = (value & 0x80) != 0;
		let result = (value << 1) | carry_in;
		state.set_flag(Flag::Z, !z_is_cleared && result == 0);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, false);
		state.set_flag(Flag::C, carry_out);
		result
	}

	/// `RRA`/`RR r`: rotate right through carry.
	pub fn rr(state: &mut CpuState, value: u8, z_is_cleared: bool) -> u8 {
		let carry_in = state.get_flag(Flag::C) as u8;
		let carry_out = (value & 0x01) != 0;
		let result = (value >> 1) | (carry_in << 7);
		state.set_flag(Flag::Z, !z_is_cleared && result == 0);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, false);
		state.set_flag(Flag::C, carry_out);
		result
	}

	/// `SLA r`: arithmetic shift left (bit 0 cleared).
	pub fn sla(state: &mut CpuState, value: u8) -> u8 {
		let carry = (value & 0x80) != 0;
		let result = value << 1;
		set_zn_h_c(state, result, false, false, carry);
		result
	}

	/// `SRA r`: arithmetic shift right (bit 7 preserved).
	pub fn sra(state: &mut CpuState, value: u8) -> u8 {
		let carry = (value & 0x01) != 0;
		let result = (value >> 1) | (value & 0x80);
		set_zn_h_c(state, result, false, false, carry);
		result
	}

	/// `SRL r`: logical shift right (bit 7 cleared).
	pub fn srl(state: &mut CpuState, value: u8) -> u8 {
		let carry = (value & 0x01) != 0;
		let result = value >> 1;
		set_zn_h_c(state, result, false, false, carry);
		result
	}

	/// `SWAP r`: exchange the high and low nibbles.
	pub fn swap(state: &mut CpuState, value: u8) -> u8 {
		let result = (value << 4) | (value >> 4);
		set_zn_h_c(state, result, false, false, false);
		result
	}

	/// `BIT u3,x`: tests bit `bit` of `value`, leaving `value` untouched.
	pub fn bit(state: &mut CpuState, bit: u8, value: u8) {
		let is_zero = (value & (1 << bit)) == 0;
		state.set_flag(Flag::Z, is_zero);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, true);
	}

	/// `RES u3,x`: clears bit `bit` of `value`.
	pub fn res(_state: &mut CpuState, bit: u8, value: u8) -> u8 {
		value & !(1 << bit)
	}

	/// `SET u3,x`: sets bit `bit` of `value`.
	pub fn set(_state: &mut CpuState, bit: u8, value: u8) -> u8 {
		value | (1 << bit)
	}

	/// Applies a binary op with `A` as the left operand and `src` as the
	/// right, writing the result back into `dst` (4 cycles).
	pub fn op_registers(op: fn(&mut CpuState, u8, u8) -> u8,
						cpu: &mut Cpu,
						dst: Register,
						src: Register) -> InsnResult {
		let lhs = cpu.registers.get(dst) as u8;
		let rhs = cpu.registers.get(src) as u8;
		let result = op(&mut cpu.registers, lhs, rhs);
		cpu.registers.set(dst, result as u16);

		Ok(4)
	}

	/// Applies a binary op with `A` and `(HL)`, writing the result back into
	/// `A` (8 cycles).
	pub fn op_mem(op: fn(&mut CpuState, u8, u8) -> u8, cpu: &mut Cpu) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let lhs = cpu.registers.get(Register::A) as u8;
		let rhs = cpu.mmap.read(address)?;
		let result = op(&mut cpu.registers, lhs, rhs);
		cpu.registers.set(Register::A, result as u16);

		Ok(8)
	}

	/// Applies a binary op with `A` and the immediate operand following the
	/// opcode, writing the result back into `A` (8 cycles).
	pub fn op_imm(op: fn(&mut CpuState, u8, u8) -> u8, cpu: &mut Cpu) -> InsnResult {
		let lhs = cpu.registers.get(Register::A) as u8;
		let rhs: u8 = cpu.fetch()?;
		let result = op(&mut cpu.registers, lhs, rhs);
		cpu.registers.set(Register::A, result as u16);

		Ok(8)
	}

	/// `INC r8` (4 cycles).
	pub fn inc_register(cpu: &mut Cpu, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		let result = inc(&mut cpu.registers, value);
		cpu.registers.set(reg, result as u16);

		Ok(4)
	}

	/// `DEC r8` (4 cycles).
	pub fn dec_register(cpu: &mut Cpu, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		let result = dec(&mut cpu.registers, value);
		cpu.registers.set(reg, result as u16);

		Ok(4)
	}

	/// `INC (HL)` (12 cycles).
	pub fn inc_mem(cpu: &mut Cpu) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		let result = inc(&mut cpu.registers, value);
		cpu.mmap.write(address, result)?;

		Ok(12)
	}

	/// `DEC (HL)` (12 cycles).
	pub fn dec_mem(cpu: &mut Cpu) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		let result = dec(&mut cpu.registers, value);
		cpu.mmap.write(address, result)?;

		Ok(12)
	}

	/// Applies a rotate (`RLC`/`RRC`/`RL`/`RR`) to a register, used by the
	/// `CB`-prefixed table (8 cycles, `Z` reflects the result).
	pub fn rotate_register(op: fn(&mut CpuState, u8, bool) -> u8,
						   cpu: &mut Cpu,
						   reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		let result = op(&mut cpu.registers, value, false);
		cpu.registers.set(reg, result as u16);

		Ok(8)
	}

	/// Applies a rotate to `(HL)` (16 cycles).
	pub fn rotate_mem(op: fn(&mut CpuState, u8, bool) -> u8, cpu: &mut Cpu) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		let result = op(&mut cpu.registers, value, false);
		cpu.mmap.write(address, result)?;

		Ok(16)
	}

	/// Applies a rotate to `A` for the unprefixed accumulator forms
	/// (`RLCA`/`RRCA`/`RLA`/`RRA`): 4 cycles, `Z` is always cleared.
	pub fn rotate_accumulator(op: fn(&mut CpuState, u8, bool) -> u8, cpu: &mut Cpu) -> InsnResult {
		let value = cpu.registers.get(Register::A) as u8;
		let result = op(&mut cpu.registers, value, true);
		cpu.registers.set(Register::A, result as u16);

		Ok(4)
	}

	/// Applies a unary op (`SLA`/`SRA`/`SWAP`/`SRL`) to a register (8 cycles).
	pub fn op_register_u8(op: fn(&mut CpuState, u8) -> u8, cpu: &mut Cpu, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		let result = op(&mut cpu.registers, value);
		cpu.registers.set(reg, result as u16);

		Ok(8)
	}

	/// Applies a unary op to `(HL)` (16 cycles).
	pub fn op_mem_u8(op: fn(&mut CpuState, u8) -> u8, cpu: &mut Cpu) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		let result = op(&mut cpu.registers, value);
		cpu.mmap.write(address, result)?;

		Ok(16)
	}

	/// `BIT u3,r` (8 cycles).
	pub fn bit_register(cpu: &mut Cpu, bit_index: u8, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		bit(&mut cpu.registers, bit_index, value);

		Ok(8)
	}

	/// `BIT u3,(HL)` (12 cycles).
	pub fn bit_mem(cpu: &mut Cpu, bit_index: u8) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		bit(&mut cpu.registers, bit_index, value);

		Ok(12)
	}

	/// `SET u3,r` (8 cycles).
	pub fn set_register_bit(cpu: &mut Cpu, bit_index: u8, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg) as u8;
		let result = set(&mut cpu.registers, bit_index, value);
		cpu.registers.set(reg, result as u16);

		Ok(8)
	}

	/// `SET u3,(HL)` (16 cycles).
	pub fn set_memory_bit(cpu: &mut Cpu, bit_index: u8) -> InsnResult {
		let address = cpu.registers.get(Register::HL);
		let value = cpu.mmap.read(address)?;
		let result = set(&mut cpu.registers, bit_index, value);
		cpu.mmap.write(address, result)?;

		Ok(16)
	}
}

/// Implementation of 16-bit arithmetic operations.
pub mod alu16 {
	use super::*;

	/// `ADD HL,rp`.
	pub fn add16(state: &mut CpuState, lhs: u16, rhs: u16) -> u16 {
		let result = lhs.wrapping_add(rhs);
		let half_carry = (lhs & 0x0FFF) + (rhs & 0x0FFF) > 0x0FFF;
		let carry = (lhs as u32) + (rhs as u32) > 0xFFFF;
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, half_carry);
		state.set_flag(Flag::C, carry);
		result
	}

	/// `ADD SP,i8` / `LD HL,SP+i8`: the signed-immediate 16-bit add whose
	/// flags are computed as if adding the 8-bit halves.
	pub fn add_sp_i8(state: &mut CpuState, sp: u16, offset: i8) -> u16 {
		let offset16 = offset as i16 as u16;
		let result = sp.wrapping_add(offset16);
		let half_carry = (sp & 0x0F) + (offset16 & 0x0F) > 0x0F;
		let carry = (sp & 0xFF) + (offset16 & 0xFF) > 0xFF;
		state.set_flag(Flag::Z, false);
		state.set_flag(Flag::N, false);
		state.set_flag(Flag::H, half_carry);
		state.set_flag(Flag::C, carry);
		result
	}

	/// `INC rp` (8 cycles, no flags affected).
	pub fn inc_register(cpu: &mut Cpu, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg);
		cpu.registers.set(reg, value.wrapping_add(1));

		Ok(8)
	}

	/// `DEC rp` (8 cycles, no flags affected).
	pub fn dec_register(cpu: &mut Cpu, reg: Register) -> InsnResult {
		let value = cpu.registers.get(reg);
		cpu.registers.set(reg, value.wrapping_sub(1));

		Ok(8)
	}

	/// `ADD HL,rp`: computes the sum and its flags, leaving the write-back
	/// (and the cycle count, which differs per caller) to the opcode.
	pub fn add(cpu: &mut Cpu, lhs: u16, rhs: u16) -> u16 {
		add16(&mut cpu.registers, lhs, rhs)
	}

	/// Fetches the signed immediate used by `ADD SP,i8` and `LD HL,SP+i8`
	/// and returns the computed result; the caller decides where it's
	/// written (`SP` or `HL`) and how many cycles that costs.
	pub fn offset_sp(cpu: &mut Cpu) -> Result<u16, crate::GameboyError> {
		let offset = cpu.fetch::<u8>()? as i8;
		let sp = cpu.registers.get(Register::SP);

		Ok(add_sp_i8(&mut cpu.registers, sp, offset))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use alloc::boxed::Box;

	fn state() -> CpuState<'static> {
		CpuState::new(Box::leak(Box::new(Config::default())))
	}

	#[test]
	fn test_add_flags() {
		let mut s = state();
		let result = alu8::add(&mut s, 0x3A, 0xC6);
		assert_eq!(0x00, result);
		assert!(s.get_flag(Flag::Z));
	}

	#[test]
	fn test_daa_after_add() {
		let mut s = state();
		s.set(Register::A, 0x45);
		let sum = alu8::add(&mut s, 0x45, 0x38);
		assert_eq!(0x7D, sum);
		let adjusted = alu8::daa(&mut s, sum);
		assert_eq!(0x83, adjusted);
		assert!(!s.get_flag(Flag::Z));
		assert!(!s.get_flag(Flag::N));
		assert!(!s.get_flag(Flag::H));
		assert!(!s.get_flag(Flag::C));
	}

	#[test]
	fn test_sub_borrow() {
		let mut s = state();
		let result = alu8::sub(&mut s, 0x00, 0x01);
		assert_eq!(0xFF, result);
		assert!(s.get_flag(Flag::C));
		assert!(s.get_flag(Flag::H));
		assert!(s.get_flag(Flag::N));
	}
}

/*
 * shardcrypt: threshold-protected encrypted backup containers
 * Copyright (C) 2020-2022 The shardcrypt Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

#![forbid(unsafe_code)]

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;

/// Shamir Secret Sharing over the BN254 prime fields.
pub mod shamir;

/// The FileCrypt container format.
///
/// A container is a single key-derivation header followed by a chain of
/// independently-configured blocks, each of which describes its own cipher,
/// block size and position in the chain.
pub mod filecrypt;

/// Transport of a set of shares (and their configuration) through the
/// FileCrypt container format.
pub mod bundle;

/// Fixed-layout wire encoding helpers shared by the shares and headers.
pub mod wire;
pub use wire::{FromWire, ToWire};

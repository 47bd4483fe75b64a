// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-frame buffer sets.
//!
//! A process group is built once per session. Each frame only needs fresh
//! buffer addresses, so under [`Protocol::Ppg`](crate::param::Protocol::Ppg)
//! those live in a small [`BufferSet`] indexed by the slot each terminal
//! recorded when its buffer was attached.

use crate::{
    bitmap::{KernelBitmap, RoutingBitmap, TerminalBitmap},
    blob::{records, to_u8, Blob, Record},
    error::{Error, Result},
    process_group::{ProcessGroup, Terminal, NO_BUFFER_INDEX},
};
use bytemuck::{Pod, Zeroable};
use std::fmt;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BufferSetHeader {
    pub token: u64,
    /// IPU address of the process group this set feeds.
    pub process_group_handle: u64,
    pub kernel_enable_bitmap: KernelBitmap,
    pub terminal_enable_bitmap: TerminalBitmap,
    pub routing_enable_bitmap: RoutingBitmap,
    pub rbm: RoutingBitmap,
    pub ipu_virtual_address: u32,
    pub frame_counter: u32,
    pub terminal_count: u8,
    pub padding: [u8; 7],
}

/// Buffer of one terminal for one frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct DynamicTerminalDescriptor {
    pub virtual_address: u32,
    pub enable_compression: u8,
    pub padding: [u8; 3],
}

records! {
    BufferSetHeader => 960,
    DynamicTerminalDescriptor => 64,
}

/// A buffer set blob.
#[derive(Clone, PartialEq, Eq)]
pub struct BufferSet {
    blob: Blob,
    header: BufferSetHeader,
}

impl BufferSet {
    /// Size in bytes of a buffer set for `group`.
    pub fn sizeof(group: &ProcessGroup) -> usize {
        BufferSetHeader::SIZE + group.terminal_count() * DynamicTerminalDescriptor::SIZE
    }

    /// Create an empty buffer set for `group`, with every terminal enabled
    /// and the token, enables and handle copied from the group.
    pub fn create(group: &ProcessGroup, frame_counter: u32) -> Result<Self> {
        let terminal_count = group.terminal_count();
        let mut blob = Blob::zeroed(Self::sizeof(group));
        let header = BufferSetHeader {
            token: group.token(),
            process_group_handle: u64::from(group.ipu_virtual_address()),
            kernel_enable_bitmap: group.kernel_bitmap(),
            terminal_enable_bitmap: TerminalBitmap::from_indices(0..terminal_count),
            routing_enable_bitmap: group.routing_bitmap(),
            rbm: RoutingBitmap::clear(),
            ipu_virtual_address: 0,
            frame_counter,
            terminal_count: to_u8("terminal count", terminal_count)?,
            padding: [0; 7],
        };
        blob.store(0, &header)?;
        Ok(Self { blob, header })
    }

    /// Reinterpret a copied buffer set blob.
    pub fn from_bytes(bytes: impl Into<Blob>) -> Result<Self> {
        let blob: Blob = bytes.into();
        let header: BufferSetHeader = blob.load(0)?;
        let descriptors = header.terminal_count as usize * DynamicTerminalDescriptor::SIZE;
        let expected = BufferSetHeader::SIZE + descriptors;
        if blob.len() != expected {
            return Err(Error::LayoutMismatch {
                what: "buffer set",
                consumed: blob.len(),
                expected,
            });
        }
        Ok(Self { blob, header })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.blob.as_bytes()
    }

    pub fn into_blob(self) -> Blob {
        self.blob
    }

    pub fn header(&self) -> &BufferSetHeader {
        &self.header
    }

    pub fn terminal_count(&self) -> usize {
        self.header.terminal_count as usize
    }

    pub fn token(&self) -> u64 {
        self.header.token
    }

    pub fn frame_counter(&self) -> u32 {
        self.header.frame_counter
    }

    pub fn process_group_handle(&self) -> u64 {
        self.header.process_group_handle
    }

    pub fn kernel_enable_bitmap(&self) -> KernelBitmap {
        self.header.kernel_enable_bitmap
    }

    pub fn terminal_enable_bitmap(&self) -> TerminalBitmap {
        self.header.terminal_enable_bitmap
    }

    pub fn routing_enable_bitmap(&self) -> RoutingBitmap {
        self.header.routing_enable_bitmap
    }

    pub fn rbm(&self) -> RoutingBitmap {
        self.header.rbm
    }

    pub fn ipu_virtual_address(&self) -> u32 {
        self.header.ipu_virtual_address
    }

    fn store_header(&mut self) -> Result<()> {
        self.blob.store(0, &self.header)
    }

    pub fn set_token(&mut self, token: u64) -> Result<()> {
        self.header.token = token;
        self.store_header()
    }

    pub fn set_frame_counter(&mut self, frame_counter: u32) -> Result<()> {
        self.header.frame_counter = frame_counter;
        self.store_header()
    }

    pub fn set_ipu_virtual_address(&mut self, address: u32) -> Result<()> {
        self.header.ipu_virtual_address = address;
        self.store_header()
    }

    pub fn set_kernel_enable_bitmap(&mut self, bitmap: KernelBitmap) -> Result<()> {
        self.header.kernel_enable_bitmap = bitmap;
        self.store_header()
    }

    pub fn set_terminal_enable_bitmap(&mut self, bitmap: TerminalBitmap) -> Result<()> {
        self.header.terminal_enable_bitmap = bitmap;
        self.store_header()
    }

    pub fn set_routing_enable_bitmap(&mut self, bitmap: RoutingBitmap) -> Result<()> {
        self.header.routing_enable_bitmap = bitmap;
        self.store_header()
    }

    pub fn set_rbm(&mut self, rbm: RoutingBitmap) -> Result<()> {
        self.header.rbm = rbm;
        self.store_header()
    }

    fn descriptor_offset(&self, index: usize) -> Result<usize> {
        if index >= self.terminal_count() {
            return Err(Error::index("buffer set slot", index, self.terminal_count()));
        }
        Ok(BufferSetHeader::SIZE + index * DynamicTerminalDescriptor::SIZE)
    }

    pub fn descriptor(&self, index: usize) -> Result<DynamicTerminalDescriptor> {
        self.blob.load(self.descriptor_offset(index)?)
    }

    /// Store the buffer address of slot `index`.
    pub fn set_buffer(&mut self, index: usize, address: u32) -> Result<()> {
        let offset = self.descriptor_offset(index)?;
        self.blob
            .update(offset, |d: &mut DynamicTerminalDescriptor| {
                d.virtual_address = address
            })
    }

    pub fn set_compression(&mut self, index: usize, enable: bool) -> Result<()> {
        let offset = self.descriptor_offset(index)?;
        self.blob
            .update(offset, |d: &mut DynamicTerminalDescriptor| {
                d.enable_compression = u8::from(enable)
            })
    }

    /// Buffer address of slot `index`.
    pub fn get_buffer_by_index(&self, index: usize) -> Result<u32> {
        Ok(self.descriptor(index)?.virtual_address)
    }

    /// Buffer address of the slot `terminal` was attached to.
    pub fn get_buffer(&self, terminal: &Terminal) -> Result<u32> {
        match terminal.buffer_index() {
            NO_BUFFER_INDEX => Err(Error::InvalidArgument(format!(
                "terminal {} has no buffer set slot",
                terminal.manifest_index()
            ))),
            index => self.get_buffer_by_index(index as usize),
        }
    }
}

impl fmt::Debug for BufferSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BufferSet")
            .field("token", &self.header.token)
            .field("frame_counter", &self.header.frame_counter)
            .field("terminals", &self.header.terminal_count)
            .finish()
    }
}

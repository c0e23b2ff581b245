//! Packets and Memory Commands.
//!
//! This module defines the unit of traffic exchanged over ports. A packet
//! carries a command, a target address, a size and a payload. Requests are
//! turned into responses in place so that the payload travels back to the
//! requester without copying.

use super::addr::Addr;
use std::fmt;

/// Identifier attached to every request and preserved by its response.
///
/// Used by the transport to match a response against the request it is
/// answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Memory command carried by a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemCmd {
    /// Read request. Answered by `ReadResp` carrying the data.
    ReadReq,
    /// Write request. Answered by `WriteResp`.
    WriteReq,
    /// Dirty block evicted from an upper level.
    ///
    /// Fire-and-forget: the receiver never answers it.
    WritebackDirty,
    /// Response to a `ReadReq`.
    ReadResp,
    /// Acknowledgement of a `WriteReq`.
    WriteResp,
}

impl MemCmd {
    /// Returns `true` for commands travelling downstream.
    pub fn is_request(&self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::WriteReq | MemCmd::WritebackDirty)
    }

    /// Returns `true` for commands travelling upstream.
    pub fn is_response(&self) -> bool {
        !self.is_request()
    }

    /// Returns `true` if the command reads data.
    pub fn is_read(&self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::ReadResp)
    }

    /// Returns `true` if the command carries data to be stored.
    pub fn is_write(&self) -> bool {
        matches!(self, MemCmd::WriteReq | MemCmd::WritebackDirty)
    }

    /// Returns `true` if the request expects a response.
    pub fn needs_response(&self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::WriteReq)
    }

    /// Returns the response command for a request, if it has one.
    pub fn response(&self) -> Option<MemCmd> {
        match self {
            MemCmd::ReadReq => Some(MemCmd::ReadResp),
            MemCmd::WriteReq => Some(MemCmd::WriteResp),
            _ => None,
        }
    }
}

impl fmt::Display for MemCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemCmd::ReadReq => "ReadReq",
            MemCmd::WriteReq => "WriteReq",
            MemCmd::WritebackDirty => "WritebackDirty",
            MemCmd::ReadResp => "ReadResp",
            MemCmd::WriteResp => "WriteResp",
        };
        f.write_str(name)
    }
}

/// A memory transaction travelling through the hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Transaction identifier.
    pub id: PacketId,
    /// Command.
    pub cmd: MemCmd,
    /// Target physical address.
    pub addr: Addr,
    /// Access size in bytes.
    pub size: usize,
    /// Payload: data to write for writes, data read for read responses.
    pub data: Vec<u8>,
}

impl Packet {
    /// Creates a read request for `size` bytes at `addr`.
    pub fn read(id: PacketId, addr: Addr, size: usize) -> Self {
        Self {
            id,
            cmd: MemCmd::ReadReq,
            addr,
            size,
            data: vec![0; size],
        }
    }

    /// Creates a write request storing `data` at `addr`.
    pub fn write(id: PacketId, addr: Addr, data: Vec<u8>) -> Self {
        Self {
            id,
            cmd: MemCmd::WriteReq,
            addr,
            size: data.len(),
            data,
        }
    }

    /// Creates a write-back of a dirty block.
    pub fn writeback(id: PacketId, addr: Addr, data: Vec<u8>) -> Self {
        Self {
            id,
            cmd: MemCmd::WritebackDirty,
            addr,
            size: data.len(),
            data,
        }
    }

    /// Returns `true` if the receiver must answer this packet.
    pub fn needs_response(&self) -> bool {
        self.cmd.needs_response()
    }

    /// Returns the block-aligned address of the packet.
    pub fn block_addr(&self, block_size: usize) -> Addr {
        self.addr & !(block_size as u64 - 1)
    }

    /// Returns the byte offset of the packet inside its block.
    pub fn block_offset(&self, block_size: usize) -> usize {
        (self.addr - self.block_addr(block_size)) as usize
    }

    /// Returns `true` if the packet is block aligned and block sized.
    pub fn is_whole_block(&self, block_size: usize) -> bool {
        self.addr == self.block_addr(block_size) && self.size == block_size
    }

    /// Returns `true` if the access stays inside one block.
    pub fn fits_in_block(&self, block_size: usize) -> bool {
        self.block_offset(block_size) + self.size <= block_size
    }

    /// Turns a request into its response in place.
    ///
    /// Write acknowledgements drop their payload; read responses keep it.
    /// Packets without a response command are left untouched.
    pub fn make_response(&mut self) {
        if let Some(cmd) = self.cmd.response() {
            if cmd == MemCmd::WriteResp {
                self.data.clear();
            }
            self.cmd = cmd;
        }
    }

    /// Copies this packet's slice of a block into the packet (read side).
    pub fn set_data_from_block(&mut self, block: &[u8], block_size: usize) {
        let offset = self.block_offset(block_size);
        self.data.clear();
        self.data
            .extend_from_slice(&block[offset..offset + self.size]);
    }

    /// Copies this packet's payload into its slice of a block (write side).
    pub fn write_data_to_block(&self, block: &mut [u8], block_size: usize) {
        let offset = self.block_offset(block_size);
        block[offset..offset + self.size].copy_from_slice(&self.data[..self.size]);
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{:#x}:{:#x}]",
            self.cmd,
            self.id,
            self.addr,
            self.addr + self.size as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_conversion_keeps_read_data_and_drops_write_data() {
        let mut read = Packet::read(PacketId(1), 0x40, 8);
        read.data = vec![7; 8];
        read.make_response();
        assert_eq!(read.cmd, MemCmd::ReadResp);
        assert_eq!(read.data, vec![7; 8]);

        let mut write = Packet::write(PacketId(2), 0x40, vec![1, 2, 3, 4]);
        write.make_response();
        assert_eq!(write.cmd, MemCmd::WriteResp);
        assert!(write.data.is_empty());

        let mut wb = Packet::writeback(PacketId(3), 0x40, vec![0; 64]);
        wb.make_response();
        assert_eq!(wb.cmd, MemCmd::WritebackDirty);
    }

    #[test]
    fn block_geometry() {
        let pkt = Packet::read(PacketId(1), 0x1234, 4);
        assert_eq!(pkt.block_addr(64), 0x1200);
        assert_eq!(pkt.block_offset(64), 0x34);
        assert!(pkt.fits_in_block(64));
        assert!(!pkt.is_whole_block(64));

        let straddling = Packet::read(PacketId(2), 0x123e, 4);
        assert!(!straddling.fits_in_block(64));
    }
}

//! Bus protocol: command set, frames and the bus-slave transport

pub mod packet;
pub mod ring_buffer;
pub mod transport;

pub use packet::{checksum, CommandFrame};
pub use ring_buffer::RingBuffer;
pub use transport::{FrameHandler, OverflowState, UsiTwiSlave};

use ufmt::derive::uDebug;

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ProtocolError {
    UnknownCommand,
    InvalidChecksum,
    PageOverflow,
    InvalidRequest,
    BufferOverflow,
    NotSupported,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

/// Reply byte for an unknown, malformed or compiled-out command
pub const UNKNOWNC: u8 = 0xFF;

/// Bootloader commands, numbered by their opcode
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Second half of the two-step handshake
    InitSoft = 0x81,
    /// Status query, first half of the handshake
    GetVersion = 0x82,
    DeleteFlash = 0x83,
    SetPageAddress = 0x84,
    WritePage = 0x85,
    ExitToApp = 0x86,
    ReadFlash = 0x87,
    ReadDeviceSignature = 0x88,
}

impl Command {
    /// Acknowledge byte that opens every reply to this command
    pub const fn ack(self) -> u8 {
        match self {
            Command::InitSoft => 0x7E,
            Command::GetVersion => 0x7D,
            Command::DeleteFlash => 0x7C,
            Command::SetPageAddress => 0x7B,
            Command::WritePage => 0x7A,
            Command::ExitToApp => 0x79,
            Command::ReadFlash => 0x78,
            Command::ReadDeviceSignature => 0x77,
        }
    }

    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(opcode: u8) -> Result<Self> {
        match opcode {
            0x81 => Ok(Command::InitSoft),
            0x82 => Ok(Command::GetVersion),
            0x83 => Ok(Command::DeleteFlash),
            0x84 => Ok(Command::SetPageAddress),
            0x85 => Ok(Command::WritePage),
            0x86 => Ok(Command::ExitToApp),
            0x87 => Ok(Command::ReadFlash),
            0x88 => Ok(Command::ReadDeviceSignature),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }
}

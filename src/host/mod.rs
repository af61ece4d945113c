//! Remote side of the protocol: a bus master that queries the bootloader
//! and dumps its flash through Read-Flash.

use embedded_hal::blocking::i2c::{Read, Write};

use crate::config::{MAX_CHECKSUM_ERRORS, SIGNATURE, TWI_TX_BUFFER_SIZE};
use crate::protocol::{checksum, Command};

/// Get-Version reply without the empty-flash byte
pub const STATUS_LEN: usize = 12;

const FEATURE_READ_FLASH: u8 = 0x80;
const EXT_FEATURE_EMPTY_CHECK: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum HostError<E> {
    Bus(E),
    /// Reply did not start with the command's acknowledge byte
    UnexpectedAck(u8),
    /// Get-Version signature is not a bootloader's
    BadSignature(u8),
    /// Read-Flash reply checksum mismatch
    ChecksumMismatch,
    /// Too many consecutive checksum mismatches during a dump
    ChecksumThreshold,
    /// Read length is zero or larger than the device can reply
    InvalidLength,
    /// The last queried status lacks the required feature
    NotSupported,
}

/// Parsed Get-Version reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub signature: u8,
    pub version_major: u8,
    pub version_minor: u8,
    pub features: u8,
    pub ext_features: u8,
    /// Bootloader start, byte address
    pub boot_start: u16,
    /// Instruction in the trampoline slot, 0xFFFF when no application
    pub trampoline: u16,
    pub low_fuse: u8,
    pub osccal: u8,
    /// Complement sum of the first flash bytes, zero on an empty device
    pub empty_check: Option<u8>,
}

impl Status {
    /// `None` when the reply is shorter than a Get-Version reply
    pub fn parse(reply: &[u8]) -> Option<Self> {
        let head: &[u8; STATUS_LEN] = reply.get(..STATUS_LEN)?.try_into().ok()?;
        Some(Self::from_reply(head, reply.get(STATUS_LEN).copied()))
    }

    /// `extra` is the byte after the fixed fields, if one was read
    fn from_reply(head: &[u8; STATUS_LEN], extra: Option<u8>) -> Self {
        let ext_features = head[5];
        let empty_check = if ext_features & EXT_FEATURE_EMPTY_CHECK != 0 {
            extra
        } else {
            None
        };
        Self {
            signature: head[1],
            version_major: head[2],
            version_minor: head[3],
            features: head[4],
            ext_features,
            boot_start: u16::from_be_bytes([head[6], head[7]]),
            trampoline: u16::from_be_bytes([head[8], head[9]]),
            low_fuse: head[10],
            osccal: head[11],
            empty_check,
        }
    }

    pub fn supports_read_flash(&self) -> bool {
        self.features & FEATURE_READ_FLASH != 0
    }

    /// An application is installed when the trampoline slot is programmed
    pub fn has_application(&self) -> bool {
        self.trampoline != 0xFFFF
    }
}

pub struct Client<I2C> {
    i2c: I2C,
    address: u8,
    max_checksum_errors: u8,
    status_len: usize,
    status: Option<Status>,
}

impl<I2C, E> Client<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            max_checksum_errors: MAX_CHECKSUM_ERRORS,
            status_len: STATUS_LEN,
            status: None,
        }
    }

    /// Consecutive checksum mismatches tolerated by [`Client::dump`]
    pub fn with_max_checksum_errors(mut self, max: u8) -> Self {
        self.max_checksum_errors = max;
        self
    }

    /// Also read the empty-flash byte of devices built with that check
    pub fn with_empty_check(mut self) -> Self {
        self.status_len = STATUS_LEN + 1;
        self
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn transfer(&mut self, frame: &[u8], reply: &mut [u8]) -> Result<(), HostError<E>> {
        self.i2c.write(self.address, frame).map_err(HostError::Bus)?;
        self.i2c.read(self.address, reply).map_err(HostError::Bus)
    }

    pub fn query_status(&mut self) -> Result<Status, HostError<E>> {
        let mut reply = [0u8; STATUS_LEN + 1];
        self.transfer(&[Command::GetVersion.opcode()], &mut reply[..self.status_len])?;

        if reply[0] != Command::GetVersion.ack() {
            return Err(HostError::UnexpectedAck(reply[0]));
        }
        if reply[1] != SIGNATURE {
            return Err(HostError::BadSignature(reply[1]));
        }
        let mut head = [0u8; STATUS_LEN];
        head.copy_from_slice(&reply[..STATUS_LEN]);
        let extra = (self.status_len > STATUS_LEN).then(|| reply[STATUS_LEN]);
        let status = Status::from_reply(&head, extra);
        self.status = Some(status);
        Ok(status)
    }

    /// One Read-Flash request for `buf.len()` bytes at `addr`
    pub fn read_flash(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), HostError<E>> {
        let len = buf.len();
        if len == 0 || len + 2 > TWI_TX_BUFFER_SIZE {
            return Err(HostError::InvalidLength);
        }
        let [high, low] = addr.to_be_bytes();
        let mut request = [Command::ReadFlash.opcode(), high, low, len as u8, 0];
        request[4] = checksum(&request[..4]);

        let mut reply = [0u8; TWI_TX_BUFFER_SIZE];
        let reply = &mut reply[..len + 2];
        self.transfer(&request, reply)?;

        if reply[0] != Command::ReadFlash.ack() {
            return Err(HostError::UnexpectedAck(reply[0]));
        }
        let data = &reply[1..=len];
        if checksum(data).wrapping_add(high).wrapping_add(low) != reply[len + 1] {
            tml_log!(warn, "read at {=u16:#x}: checksum mismatch", addr);
            return Err(HostError::ChecksumMismatch);
        }
        buf.copy_from_slice(data);
        Ok(())
    }

    /// Read `flash_size` bytes in `chunk`-sized requests, handing each chunk
    /// to `out`. A chunk with a bad checksum is requested again; the dump
    /// stops once the mismatches in a row exceed the configured maximum.
    pub fn dump<F>(&mut self, flash_size: u16, chunk: u8, mut out: F) -> Result<(), HostError<E>>
    where
        F: FnMut(u16, &[u8]),
    {
        match self.status {
            Some(status) if status.supports_read_flash() => {}
            _ => return Err(HostError::NotSupported),
        }
        if chunk == 0 {
            return Err(HostError::InvalidLength);
        }

        let mut buf = [0u8; TWI_TX_BUFFER_SIZE];
        let mut errors = 0u8;
        let mut addr = 0u16;
        while addr < flash_size {
            let len = (chunk as u16).min(flash_size - addr) as usize;
            match self.read_flash(addr, &mut buf[..len]) {
                Ok(()) => {
                    errors = 0;
                    out(addr, &buf[..len]);
                    addr += len as u16;
                }
                Err(HostError::ChecksumMismatch) => {
                    errors += 1;
                    if errors > self.max_checksum_errors {
                        tml_log!(error, "dump aborted at {=u16:#x}", addr);
                        return Err(HostError::ChecksumThreshold);
                    }
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}

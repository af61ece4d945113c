//! Command dispatcher: one reply per received frame

use super::page_writer::PageWriter;
use super::state::{BootloaderState, Flag};
use crate::config::{Config, FLASH_SIZE, SIGNATURE, VERSION_MAJOR, VERSION_MINOR};
use crate::hal::flash::{DeviceInfo, FlashMemory};
use crate::protocol::transport::{FrameHandler, TxBuffer};
use crate::protocol::{checksum, Command, CommandFrame, ProtocolError, Result, UNKNOWNC};

/// Flash bytes summed by the empty-application check
const EMPTY_CHECK_LEN: u16 = 100;

/// Borrows the bootloader context for the duration of one transport poll
pub struct Dispatcher<'a, F, D> {
    config: &'a Config,
    state: &'a mut BootloaderState,
    flash: &'a mut F,
    device: &'a D,
}

impl<'a, F: FlashMemory, D: DeviceInfo> Dispatcher<'a, F, D> {
    pub fn new(config: &'a Config, state: &'a mut BootloaderState, flash: &'a mut F, device: &'a D) -> Self {
        Self {
            config,
            state,
            flash,
            device,
        }
    }

    /// Commands compiled in by the configuration
    pub fn is_enabled(&self, command: Command) -> bool {
        match command {
            Command::GetVersion | Command::ExitToApp | Command::DeleteFlash | Command::WritePage => true,
            Command::SetPageAddress => self.config.cmd_setpgaddr || !self.config.auto_page_addr,
            Command::ReadFlash => self.config.cmd_readflash,
            Command::InitSoft => self.config.two_step_init,
            Command::ReadDeviceSignature => self.config.cmd_readdevs,
        }
    }

    fn execute(&mut self, command: Command, frame: &CommandFrame, reply: &mut TxBuffer) -> Result<()> {
        match command {
            Command::GetVersion => self.get_version(reply),
            Command::ExitToApp => {
                reply.push(command.ack());
                self.state.flags.set(Flag::ExitToApp);
                self.state.flags.set(Flag::Init1);
            }
            Command::DeleteFlash => {
                reply.push(command.ack());
                self.state.flags.set(Flag::DeleteFlash);
                tml_log!(warn, "flash erase requested");
            }
            Command::InitSoft => {
                reply.push(command.ack());
                self.state.flags.set(Flag::Init2);
            }
            Command::SetPageAddress => self.set_page_address(frame, reply)?,
            Command::WritePage => self.write_page(frame, reply),
            Command::ReadFlash => self.read_flash(frame, reply)?,
            Command::ReadDeviceSignature => self.read_device_signature(reply),
        }
        Ok(())
    }

    fn get_version(&mut self, reply: &mut TxBuffer) {
        let start = self.config.boot_start;
        reply.extend_from_slice(&[
            Command::GetVersion.ack(),
            SIGNATURE,
            VERSION_MAJOR,
            VERSION_MINOR,
            self.config.features(),
            self.config.ext_features(),
        ]);
        reply.extend_from_slice(&start.to_be_bytes());
        // Trampoline as installed, MSB first
        reply.push(self.flash.read_byte(start - 1));
        reply.push(self.flash.read_byte(start - 2));
        reply.push(self.device.low_fuse());
        reply.push(self.device.osccal());
        if self.config.check_empty_fl {
            let empty_check = (0..EMPTY_CHECK_LEN).fold(0u8, |sum, addr| sum.wrapping_add(!self.flash.read_byte(addr)));
            reply.push(empty_check);
        }
        self.state.flags.set(Flag::Init1);
    }

    fn set_page_address(&mut self, frame: &CommandFrame, reply: &mut TxBuffer) -> Result<()> {
        if frame.operands().len() < 2 {
            return Err(ProtocolError::InvalidRequest);
        }
        let (high, low) = (frame.operand(0), frame.operand(1));
        self.state.page_addr = u16::from_be_bytes([high, low]) & !(self.config.page_size - 1);
        reply.push(Command::SetPageAddress.ack());
        reply.push(high.wrapping_add(low));
        tml_log!(debug, "page address {=u16:#x}", self.state.page_addr);
        Ok(())
    }

    /// Frame: opcode, `mst_packet_size` data bytes, checksum. A bad checksum,
    /// a malformed frame or a page index overflow answers a zero checksum and
    /// schedules the safety erase.
    fn write_page(&mut self, frame: &CommandFrame, reply: &mut TxBuffer) {
        let size = self.config.mst_packet_size as usize;
        let operands = frame.operands();
        reply.push(Command::WritePage.ack());

        if operands.len() != size + 1 {
            tml_log!(error, "write frame with {=usize} operands", operands.len());
            self.state.flags.set(Flag::DeleteFlash);
            reply.push(0);
            return;
        }

        let (data, expected) = (&operands[..size], operands[size]);
        let sum = PageWriter::new(self.config, self.state, self.flash).stage(data);

        if sum != expected || self.state.page_ix as u16 > self.config.page_size {
            tml_log!(error, "page data rejected: sum {=u8:#x} expected {=u8:#x}", sum, expected);
            self.state.flags.set(Flag::DeleteFlash);
            reply.push(0);
        } else {
            reply.push(sum);
        }
    }

    /// Frame: opcode, address MSB, address LSB, length, request checksum
    fn read_flash(&mut self, frame: &CommandFrame, reply: &mut TxBuffer) -> Result<()> {
        if frame.len() < 5 {
            return Err(ProtocolError::InvalidRequest);
        }
        let request = &frame.as_bytes()[..4];
        if checksum(request) != frame.operand(3) {
            return Err(ProtocolError::InvalidChecksum);
        }
        let (high, low, len) = (request[1], request[2], request[3]);
        let addr = u16::from_be_bytes([high, low]);
        if len == 0 || len > self.config.slv_packet_size || addr as u32 + len as u32 > FLASH_SIZE as u32 {
            return Err(ProtocolError::InvalidRequest);
        }

        reply.push(Command::ReadFlash.ack());
        let mut sum = high.wrapping_add(low);
        for offset in 0..len as u16 {
            let byte = self.flash.read_byte(addr + offset);
            reply.push(byte);
            sum = sum.wrapping_add(byte);
        }
        reply.push(sum);
        Ok(())
    }

    fn read_device_signature(&mut self, reply: &mut TxBuffer) {
        let device = self.device;
        reply.extend_from_slice(&[
            Command::ReadDeviceSignature.ack(),
            device.low_fuse(),
            device.high_fuse(),
            device.extended_fuse(),
            device.lock_bits(),
            device.signature_byte(0x00),
            device.signature_byte(0x02),
            device.signature_byte(0x04),
            device.signature_byte(0x01),
            device.signature_byte(0x03),
        ]);
    }
}

impl<'a, F: FlashMemory, D: DeviceInfo> FrameHandler for Dispatcher<'a, F, D> {
    fn handle_frame(&mut self, frame: &CommandFrame, reply: &mut TxBuffer) {
        let result = Command::try_from(frame.opcode()).and_then(|command| {
            if !self.is_enabled(command) {
                return Err(ProtocolError::NotSupported);
            }
            tml_log!(trace, "dispatch {}", command);
            self.execute(command, frame, reply)
        });

        if let Err(error) = result {
            tml_log!(warn, "opcode {=u8:#x} rejected: {}", frame.opcode(), error);
            reply.clear();
            reply.push(UNKNOWNC);
        }
    }
}

//! Polled USI two-wire bus slave
//!
//! The start-condition and counter-overflow flags are polled from the main
//! loop and handled inline. A read request first hands the received frame to
//! the [`FrameHandler`], then streams its reply out of the TX buffer.

use core::convert::Infallible;

use super::packet::CommandFrame;
use super::ring_buffer::RingBuffer;
use crate::config::{TWI_RX_BUFFER_SIZE, TWI_TX_BUFFER_SIZE};
use crate::hal::usi::UsiPort;

pub type RxBuffer = RingBuffer<TWI_RX_BUFFER_SIZE>;
pub type TxBuffer = RingBuffer<TWI_TX_BUFFER_SIZE>;

/// Address byte of a general call write
const GENERAL_CALL: u8 = 0x00;

/// Processes a received frame and queues the reply bytes
pub trait FrameHandler {
    fn handle_frame(&mut self, frame: &CommandFrame, reply: &mut TxBuffer);
}

/// Counter-overflow phase of the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum OverflowState {
    CheckAddress,
    SendData,
    WaitAckAfterSend,
    CheckAck,
    WaitReceive,
    ReceiveAndAck,
}

pub struct UsiTwiSlave<U> {
    usi: U,
    address: u8,
    state: OverflowState,
    awaiting_start: bool,
    rx: RxBuffer,
    tx: TxBuffer,
    frame: CommandFrame,
}

impl<U: UsiPort> UsiTwiSlave<U> {
    /// Release the bus lines and wait for a start condition
    pub fn new(mut usi: U, address: u8) -> Self {
        usi.init_lines();
        usi.wait_for_address();
        Self {
            usi,
            address,
            state: OverflowState::CheckAddress,
            awaiting_start: true,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            frame: CommandFrame::new(),
        }
    }

    /// Handle whatever the USI flags report.
    ///
    /// Returns `Ok(())` once the master has NACKed the last reply byte, which
    /// is the only point where slow operations may run.
    pub fn poll<H: FrameHandler>(&mut self, handler: &mut H) -> nb::Result<(), Infallible> {
        if self.usi.start_condition_pending() {
            self.on_start();
        }
        if self.usi.counter_overflow_pending() && self.on_overflow(handler) {
            return Ok(());
        }
        Err(nb::Error::WouldBlock)
    }

    /// Re-armed and waiting for the next start condition
    pub fn is_idle(&self) -> bool {
        self.awaiting_start
    }

    pub fn state(&self) -> OverflowState {
        self.state
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn rearm(&mut self) {
        self.state = OverflowState::CheckAddress;
        self.awaiting_start = true;
        self.usi.wait_for_address();
    }

    fn on_start(&mut self) {
        self.usi.set_sda_output(false);
        self.state = OverflowState::CheckAddress;
        self.awaiting_start = false;
        // The start detector holds SCL low once the condition completes
        while self.usi.scl_is_high() && !self.usi.sda_is_high() {}
        if !self.usi.sda_is_high() {
            self.usi.detect_restart();
        } else {
            // Stop right after start: nothing to shift in
            tml_log!(trace, "stop while waiting for address");
            self.usi.detect_start();
            self.awaiting_start = true;
        }
        self.usi.shift_address_bits();
    }

    fn on_overflow<H: FrameHandler>(&mut self, handler: &mut H) -> bool {
        match self.state {
            OverflowState::CheckAddress => {
                let byte = self.usi.data();
                if byte == GENERAL_CALL || byte >> 1 == self.address {
                    if byte & 0x01 != 0 {
                        self.dispatch(handler);
                        self.state = OverflowState::SendData;
                    } else {
                        self.state = OverflowState::WaitReceive;
                    }
                    self.usi.send_ack();
                } else {
                    self.rearm();
                }
                false
            }
            OverflowState::CheckAck => {
                if self.usi.data() != 0 {
                    // NACK: the master has read everything it wanted
                    self.rearm();
                    return true;
                }
                self.send_next();
                false
            }
            OverflowState::SendData => {
                self.send_next();
                false
            }
            OverflowState::WaitAckAfterSend => {
                self.state = OverflowState::CheckAck;
                self.usi.receive_ack();
                false
            }
            OverflowState::WaitReceive => {
                self.state = OverflowState::ReceiveAndAck;
                self.usi.receive_byte();
                false
            }
            OverflowState::ReceiveAndAck => {
                self.rx.push(self.usi.data());
                self.state = OverflowState::WaitReceive;
                self.usi.send_ack();
                false
            }
        }
    }

    fn send_next(&mut self) {
        if self.tx.is_empty() {
            self.usi.receive_ack();
            self.rearm();
            return;
        }
        let byte = self.tx.pop();
        self.usi.set_data(byte);
        self.state = OverflowState::WaitAckAfterSend;
        self.usi.send_byte();
    }

    /// Hand the bytes written since the last read to the frame handler.
    /// A read without a new frame keeps streaming the pending reply.
    fn dispatch<H: FrameHandler>(&mut self, handler: &mut H) {
        if self.rx.is_empty() {
            return;
        }
        self.frame.clear();
        while !self.rx.is_empty() {
            self.frame.push(self.rx.pop());
        }
        self.tx.clear();
        handler.handle_frame(&self.frame, &mut self.tx);
    }
}
